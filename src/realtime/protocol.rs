use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ludo::{DiceValue, PieceId, Position, UserId, ValidMove};
use crate::matches::types::{MatchId, MatchSnapshot, RosterEntry, Settlement};

/// Frames sent by a connected client: `{"event": "...", "data": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinMatch { match_id: MatchId },
    RollDice { match_id: MatchId },
    MovePiece { match_id: MatchId, piece_id: PieceId },
    EmojiReaction { match_id: MatchId, emoji: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinMatch { .. } => "join_match",
            ClientEvent::RollDice { .. } => "roll_dice",
            ClientEvent::MovePiece { .. } => "move_piece",
            ClientEvent::EmojiReaction { .. } => "emoji_reaction",
        }
    }

    pub fn match_id(&self) -> MatchId {
        match self {
            ClientEvent::JoinMatch { match_id }
            | ClientEvent::RollDice { match_id }
            | ClientEvent::MovePiece { match_id, .. }
            | ClientEvent::EmojiReaction { match_id, .. } => *match_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnChangeReason {
    Move,
    ExtraRoll,
    NoValidMoves,
    ThreeSixes,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub user_id: UserId,
    pub piece_id: PieceId,
    pub dice_value: DiceValue,
    pub from_position: Position,
    pub to_position: Position,
}

/// Frames pushed to clients, either to a match room or to one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    MatchState(MatchSnapshot),
    DiceResult {
        match_id: MatchId,
        user_id: UserId,
        dice_value: DiceValue,
        valid_moves: Vec<ValidMove>,
        forfeited: bool,
    },
    ValidMoves {
        match_id: MatchId,
        moves: Vec<ValidMove>,
    },
    MatchUpdate {
        snapshot: MatchSnapshot,
        last_move: Option<LastMove>,
    },
    PieceKilled {
        match_id: MatchId,
        killer_id: UserId,
        victim_id: UserId,
        piece_id: PieceId,
    },
    PieceHome {
        match_id: MatchId,
        user_id: UserId,
        piece_id: PieceId,
    },
    TurnChange {
        match_id: MatchId,
        user_id: UserId,
        turn_deadline: DateTime<Utc>,
        reason: TurnChangeReason,
    },
    GameStarted {
        match_id: MatchId,
        turn_user_id: UserId,
        turn_deadline: DateTime<Utc>,
    },
    MatchReady {
        match_id: MatchId,
        players: Vec<RosterEntry>,
    },
    GameEnded(Settlement),
    PlayerDisconnected {
        match_id: MatchId,
        user_id: UserId,
        reconnect_window_seconds: u64,
    },
    PlayerEliminated {
        match_id: MatchId,
        user_id: UserId,
        reason: String,
    },
    EmojiReaction {
        match_id: MatchId,
        user_id: UserId,
        emoji: String,
    },
    Ack {
        action: String,
        match_id: MatchId,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MatchState(_) => "match_state",
            ServerEvent::DiceResult { .. } => "dice_result",
            ServerEvent::ValidMoves { .. } => "valid_moves",
            ServerEvent::MatchUpdate { .. } => "match_update",
            ServerEvent::PieceKilled { .. } => "piece_killed",
            ServerEvent::PieceHome { .. } => "piece_home",
            ServerEvent::TurnChange { .. } => "turn_change",
            ServerEvent::GameStarted { .. } => "game_started",
            ServerEvent::MatchReady { .. } => "match_ready",
            ServerEvent::GameEnded(_) => "game_ended",
            ServerEvent::PlayerDisconnected { .. } => "player_disconnected",
            ServerEvent::PlayerEliminated { .. } => "player_eliminated",
            ServerEvent::EmojiReaction { .. } => "emoji_reaction",
            ServerEvent::Ack { .. } => "ack",
            ServerEvent::Error { .. } => "error",
        }
    }
}
