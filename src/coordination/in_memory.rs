use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CoordinationError, CoordinationStore};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Single-process store; expired entries are hidden on read and dropped by the sweeper.
#[derive(Default)]
pub struct InMemoryCoordinationStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinationError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CoordinationError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CoordinationError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: now,
        });
        let current = if entry.is_live(now) {
            entry
                .value
                .parse::<i64>()
                .map_err(|_| CoordinationError::Corrupt {
                    key: key.to_string(),
                    value: entry.value.clone(),
                })?
        } else {
            0
        };
        let next = current + 1;
        entry.value = next.to_string();
        entry.expires_at = now + ttl;
        Ok(next)
    }

    async fn purge_expired(&self) -> Result<u64, CoordinationError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() -> anyhow::Result<()> {
        let store = InMemoryCoordinationStore::new();
        store.set("k", "v", Duration::from_secs(60)).await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(store.get("k").await?, None);
        assert_eq!(store.purge_expired().await?, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn incr_counts_from_zero_and_restarts_after_expiry() -> anyhow::Result<()> {
        let store = InMemoryCoordinationStore::new();
        let ttl = Duration::from_secs(300);
        assert_eq!(store.incr("sixes", ttl).await?, 1);
        assert_eq!(store.incr("sixes", ttl).await?, 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(store.incr("sixes", ttl).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn incr_rejects_non_numeric_values() -> anyhow::Result<()> {
        let store = InMemoryCoordinationStore::new();
        store.set("k", "not-a-number", Duration::from_secs(5)).await?;
        assert!(matches!(
            store.incr("k", Duration::from_secs(5)).await,
            Err(CoordinationError::Corrupt { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_every_listed_key() -> anyhow::Result<()> {
        let store = InMemoryCoordinationStore::new();
        let ttl = Duration::from_secs(5);
        store.set("a", "1", ttl).await?;
        store.set("b", "2", ttl).await?;
        store.set("c", "3", ttl).await?;

        store.delete(&["a".to_string(), "b".to_string()]).await?;
        assert_eq!(store.get("a").await?, None);
        assert_eq!(store.get("b").await?, None);
        assert_eq!(store.get("c").await?.as_deref(), Some("3"));
        Ok(())
    }
}
