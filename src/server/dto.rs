use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::ludo::UserId;
use crate::matches::types::{
    CreateMatchRequest, DisputeRequest, GameMode, LobbyFilter, MatchId, MatchStatus, PageRequest,
    ReadyOutcome, ResolveMatchRequest,
};

#[derive(Debug, Deserialize)]
pub struct CreateMatchBody {
    pub game_mode: GameMode,
    pub entry_fee: Decimal,
}

impl From<CreateMatchBody> for CreateMatchRequest {
    fn from(body: CreateMatchBody) -> Self {
        Self {
            game_mode: body.game_mode,
            entry_fee: body.entry_fee,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LobbyQuery {
    pub game_mode: Option<GameMode>,
    pub entry_fee_min: Option<Decimal>,
    pub entry_fee_max: Option<Decimal>,
}

impl From<LobbyQuery> for LobbyFilter {
    fn from(query: LobbyQuery) -> Self {
        Self {
            game_mode: query.game_mode,
            entry_fee_min: query.entry_fee_min,
            entry_fee_max: query.entry_fee_max,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        let defaults = PageRequest::default();
        Self {
            page: query.page.unwrap_or(defaults.page),
            limit: query.limit.unwrap_or(defaults.limit),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    pub reason: String,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

impl From<DisputeBody> for DisputeRequest {
    fn from(body: DisputeBody) -> Self {
        Self {
            reason: body.reason,
            evidence_urls: body.evidence_urls,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub winner_id: UserId,
    #[serde(default)]
    pub note: Option<String>,
}

impl From<ResolveBody> for ResolveMatchRequest {
    fn from(body: ResolveBody) -> Self {
        Self {
            winner_id: body.winner_id,
            note: body.note,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub match_id: MatchId,
    pub all_ready: bool,
    pub status: MatchStatus,
}

impl ReadyResponse {
    pub fn from_outcome(match_id: MatchId, outcome: &ReadyOutcome) -> Self {
        Self {
            match_id,
            all_ready: outcome.all_ready,
            status: if outcome.started.is_some() {
                MatchStatus::InProgress
            } else {
                MatchStatus::Ready
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub const OK: StatusResponse = StatusResponse { status: "ok" };
}
