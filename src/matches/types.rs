use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::ludo::{
    Color, DiceValue, MoveKind, PieceId, Pieces, Position, UserId, ValidMove,
};

pub type MatchId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    OneVOne,
    TwoVTwo,
    FourPlayer,
}

impl GameMode {
    pub const fn max_players(self) -> u8 {
        match self {
            GameMode::OneVOne => 2,
            GameMode::TwoVTwo | GameMode::FourPlayer => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Waiting,
    Ready,
    InProgress,
    Completed,
    Cancelled,
    Disputed,
}

impl MatchStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }

    pub const fn is_pre_start(self) -> bool {
        matches!(self, MatchStatus::Waiting | MatchStatus::Ready)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "WAITING",
            MatchStatus::Ready => "READY",
            MatchStatus::InProgress => "IN_PROGRESS",
            MatchStatus::Completed => "COMPLETED",
            MatchStatus::Cancelled => "CANCELLED",
            MatchStatus::Disputed => "DISPUTED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagerStatus {
    Active,
    Won,
    Lost,
    Refunded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    Resolved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("admin") {
            UserRole::Admin
        } else {
            UserRole::User
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
}

impl UserStats {
    pub fn record(&mut self, won: bool) {
        self.games_played += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.win_rate = f64::from(self.wins) / f64::from(self.games_played);
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub role: UserRole,
    pub is_banned: bool,
    pub stats: UserStats,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub code: String,
    pub game_mode: GameMode,
    pub entry_fee: Decimal,
    pub prize_pool: Decimal,
    pub platform_fee: Decimal,
    pub max_players: u8,
    pub current_players: u8,
    pub status: MatchStatus,
    pub turn_user_id: Option<UserId>,
    pub turn_deadline: Option<DateTime<Utc>>,
    pub turn_number: u32,
    pub winner_id: Option<UserId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    pub fn winner_prize(&self) -> Decimal {
        self.prize_pool - self.platform_fee
    }

    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }

    pub fn is_turn_of(&self, user_id: UserId) -> bool {
        self.turn_user_id == Some(user_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub color: Color,
    pub pieces: Pieces,
    pub pieces_home: u8,
    pub is_eliminated: bool,
    pub final_rank: Option<u8>,
    pub joined_at: DateTime<Utc>,
}

impl PlayerRecord {
    pub fn new(match_id: MatchId, user_id: UserId, color: Color, joined_at: DateTime<Utc>) -> Self {
        Self {
            match_id,
            user_id,
            color,
            pieces: Pieces::initial(),
            pieces_home: 0,
            is_eliminated: false,
            final_rank: None,
            joined_at,
        }
    }
}

/// Immutable audit entry; a `None` piece marks a pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub turn_number: u32,
    pub dice_value: DiceValue,
    pub piece_id: Option<PieceId>,
    pub from_position: Position,
    pub to_position: Position,
    pub is_kill: bool,
    pub killed_user_id: Option<UserId>,
    pub killed_piece_id: Option<PieceId>,
    pub is_home_entry: bool,
    pub kind: MoveKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WagerRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub match_id: MatchId,
    pub entry_amount: Decimal,
    pub potential_win: Decimal,
    pub actual_win: Option<Decimal>,
    pub net_profit: Option<Decimal>,
    pub status: WagerStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub id: Uuid,
    pub user_id: UserId,
    pub match_id: MatchId,
    pub reason: String,
    pub evidence_urls: Vec<String>,
    pub status: DisputeStatus,
    pub resolution_note: Option<String>,
    pub resolved_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// ---- service inputs -------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMatchRequest {
    pub game_mode: GameMode,
    pub entry_fee: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyFilter {
    pub game_mode: Option<GameMode>,
    pub entry_fee_min: Option<Decimal>,
    pub entry_fee_max: Option<Decimal>,
}

impl LobbyFilter {
    pub fn accepts(&self, record: &MatchRecord) -> bool {
        record.status == MatchStatus::Waiting
            && self.game_mode.map_or(true, |mode| mode == record.game_mode)
            && self.entry_fee_min.map_or(true, |min| record.entry_fee >= min)
            && self.entry_fee_max.map_or(true, |max| record.entry_fee <= max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveMatchRequest {
    pub winner_id: UserId,
    #[serde(default)]
    pub note: Option<String>,
}

// ---- service outputs ------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub user_id: UserId,
    pub username: String,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: MatchId,
    pub code: String,
    pub game_mode: GameMode,
    pub entry_fee: Decimal,
    pub prize_pool: Decimal,
    pub platform_fee: Decimal,
    pub max_players: u8,
    pub current_players: u8,
    pub status: MatchStatus,
    pub winner_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub players: Vec<RosterEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub user_id: UserId,
    pub username: String,
    pub color: Color,
    pub pieces: Pieces,
    pub pieces_home: u8,
    pub is_eliminated: bool,
    pub final_rank: Option<u8>,
}

/// Full authoritative view of a match, rebuilt from storage on every request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub status: MatchStatus,
    pub turn_user_id: Option<UserId>,
    pub turn_deadline: Option<DateTime<Utc>>,
    pub turn_number: u32,
    pub players: Vec<PlayerSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPage {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub matches: Vec<MatchSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnHandoff {
    pub user_id: UserId,
    pub deadline: DateTime<Utc>,
    /// Turn this handoff opened; a timer armed for an older turn is stale.
    pub turn_number: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyOutcome {
    pub all_ready: bool,
    pub started: Option<TurnHandoff>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub dice_value: DiceValue,
    pub valid_moves: Vec<ValidMove>,
    pub forfeited: bool,
    /// Set when the roll ended the caller's turn without a move.
    pub turn_passed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub is_kill: bool,
    pub killed_user_id: Option<UserId>,
    pub killed_piece_id: Option<PieceId>,
    pub is_home: bool,
    pub is_win: bool,
    pub next_user_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub match_id: MatchId,
    pub winner_id: UserId,
    pub prize_pool: Decimal,
    pub winner_prize: Decimal,
    pub platform_fee: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// The turn had already moved on or the match is no longer live.
    Stale,
    TurnPassed { strikes: i64, next: TurnHandoff },
    Eliminated { next: Option<TurnHandoff> },
    Settled(Settlement),
}
