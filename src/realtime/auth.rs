use std::sync::Arc;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::engine::ludo::UserId;
use crate::matches::storage::MatchStorage;
use crate::matches::types::UserRole;
use crate::matches::MatchError;

const LOG_TARGET: &str = "realtime::auth";

/// HS256 claims issued by the account service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub exp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("unknown user")]
    UnknownUser,
    #[error("account is banned")]
    Banned,
    #[error("storage error: {0}")]
    Storage(#[from] MatchError),
}

/// Resolves a bearer token to an active account, once per connection or request.
pub struct Authenticator {
    key: DecodingKey,
    validation: Validation,
    storage: Arc<dyn MatchStorage>,
}

impl Authenticator {
    pub fn new(secret: &[u8], storage: Arc<dyn MatchStorage>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            storage,
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let claims = decode::<Claims>(token, &self.key, &self.validation)?.claims;

        let mut txn = self.storage.begin().await?;
        let account = match txn.load_user(claims.sub).await {
            Ok(account) => {
                txn.commit().await?;
                account
            }
            Err(err) => {
                txn.rollback().await;
                return Err(err.into());
            }
        };

        let account = account.ok_or(AuthError::UnknownUser)?;
        if account.is_banned {
            tracing::info!(target = LOG_TARGET, user_id = %account.id, "banned account refused");
            return Err(AuthError::Banned);
        }
        Ok(AuthenticatedUser {
            user_id: account.id,
            username: account.username,
            role: account.role,
        })
    }
}

/// Token from `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
