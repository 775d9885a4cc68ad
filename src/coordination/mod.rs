//! Ephemeral, TTL'd key/value state shared by every process serving matches.
//!
//! Values here are hints layered over the durable match rows: losing them only
//! costs a pending roll or a strike, never money.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ::sea_orm::DbErr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::tokio_tools::spawn_named_task;

pub mod in_memory;
pub mod keys;
pub mod match_keys;
pub mod sea_orm;

pub use in_memory::InMemoryCoordinationStore;
pub use match_keys::MatchCoordination;
pub use self::sea_orm::SeaOrmCoordinationStore;

const LOG_TARGET: &str = "coordination";

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("corrupt value {value:?} under key {key}")]
    Corrupt { key: String, value: String },
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinationError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    async fn delete(&self, keys: &[String]) -> Result<(), CoordinationError>;

    /// Atomically add one to the integer under `key` and refresh its TTL.
    /// A missing or expired key counts from zero.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CoordinationError>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, CoordinationError>;
}

/// Periodically purges expired keys until `shutdown` fires.
pub fn spawn_sweeper(
    store: Arc<dyn CoordinationStore>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_named_task("coordination-sweeper", async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(removed) => {
                            tracing::debug!(target = LOG_TARGET, removed, "purged expired coordination keys");
                        }
                        Err(err) => {
                            tracing::warn!(target = LOG_TARGET, error = %err, "coordination sweep failed");
                        }
                    }
                }
            }
        }
    })
}
