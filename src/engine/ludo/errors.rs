use super::types::PieceId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("dice value {0} is outside 1..=6")]
    InvalidDice(u8),
    #[error("invalid move")]
    IllegalMove,
}

/// Raised when persisted or client-supplied piece state fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PieceStateError {
    #[error("expected 4 pieces, found {0}")]
    WrongCount(usize),
    #[error("duplicate piece {0}")]
    DuplicatePiece(PieceId),
    #[error("malformed piece id {0:?}")]
    BadPieceId(String),
    #[error("piece position {0} outside -1..=57")]
    PositionOutOfRange(i16),
    #[error("unknown color {0:?}")]
    UnknownColor(String),
    #[error("malformed piece state: {0}")]
    Malformed(String),
}
