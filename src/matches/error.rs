use sea_orm::DbErr;

use crate::coordination::CoordinationError;
use crate::engine::ludo::{MoveError, PieceStateError};
use crate::wallet::WalletError;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("coordination error: {0}")]
    Coordination(#[from] CoordinationError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl MatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Errors the caller caused and can read about; everything else is reported generically.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            MatchError::Validation(_) | MatchError::NotFound(_) | MatchError::Forbidden(_)
        )
    }

    /// Text safe to show a client. Storage and internal failures stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            MatchError::Validation(msg) | MatchError::Forbidden(msg) => msg.clone(),
            MatchError::NotFound(what) => format!("{what} not found"),
            _ => "internal error".to_owned(),
        }
    }
}

impl From<WalletError> for MatchError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Insufficient(_) => MatchError::validation("Insufficient balance"),
            WalletError::NotFound(_) => MatchError::NotFound("wallet"),
            WalletError::NonPositive(amount) => {
                MatchError::validation(format!("amount must be positive, got {amount}"))
            }
            WalletError::Database(err) => MatchError::Database(err),
        }
    }
}

impl From<MoveError> for MatchError {
    fn from(err: MoveError) -> Self {
        match err {
            MoveError::IllegalMove => MatchError::validation("Invalid move"),
            other => MatchError::validation(other.to_string()),
        }
    }
}

impl From<PieceStateError> for MatchError {
    fn from(err: PieceStateError) -> Self {
        MatchError::internal(format!("corrupt piece state: {err}"))
    }
}
