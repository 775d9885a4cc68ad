use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::engine::ludo::DiceValue;

use super::{keys, CoordinationError, CoordinationStore};

/// Typed view of the coordination keys a single match uses.
#[derive(Clone)]
pub struct MatchCoordination {
    store: Arc<dyn CoordinationStore>,
    rules: MatchRules,
}

impl MatchCoordination {
    pub fn new(store: Arc<dyn CoordinationStore>, rules: MatchRules) -> Self {
        Self { store, rules }
    }

    pub async fn mark_ready(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CoordinationError> {
        self.store
            .set(&keys::ready(match_id, user_id), "1", self.rules.ready_ttl)
            .await
    }

    pub async fn is_ready(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, CoordinationError> {
        Ok(self.store.get(&keys::ready(match_id, user_id)).await?.is_some())
    }

    pub async fn clear_ready(
        &self,
        match_id: Uuid,
        users: &[Uuid],
    ) -> Result<(), CoordinationError> {
        let keys: Vec<String> = users
            .iter()
            .map(|user_id| keys::ready(match_id, *user_id))
            .collect();
        self.store.delete(&keys).await
    }

    pub async fn store_dice(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        dice: DiceValue,
    ) -> Result<(), CoordinationError> {
        self.store
            .set(
                &keys::dice(match_id, user_id),
                &dice.to_string(),
                self.rules.dice_ttl,
            )
            .await
    }

    pub async fn pending_dice(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DiceValue>, CoordinationError> {
        let key = keys::dice(match_id, user_id);
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(raw) => match raw.parse::<DiceValue>() {
                Ok(value) if (1..=6).contains(&value) => Ok(Some(value)),
                _ => Err(CoordinationError::Corrupt { key, value: raw }),
            },
        }
    }

    pub async fn clear_dice(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CoordinationError> {
        self.store.delete(&[keys::dice(match_id, user_id)]).await
    }

    /// Bumps the consecutive-six streak and returns its new length.
    pub async fn record_six(&self, match_id: Uuid) -> Result<i64, CoordinationError> {
        self.store
            .incr(&keys::consecutive_sixes(match_id), self.rules.sixes_ttl)
            .await
    }

    /// Current consecutive-six streak; zero when unset or expired.
    pub async fn sixes_streak(&self, match_id: Uuid) -> Result<i64, CoordinationError> {
        self.counter(keys::consecutive_sixes(match_id)).await
    }

    pub async fn reset_sixes(&self, match_id: Uuid) -> Result<(), CoordinationError> {
        self.store.delete(&[keys::consecutive_sixes(match_id)]).await
    }

    /// Records one strike and returns the running total.
    pub async fn add_strike(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<i64, CoordinationError> {
        self.store
            .incr(&keys::timeouts(match_id, user_id), self.rules.strike_ttl)
            .await
    }

    pub async fn strikes(&self, match_id: Uuid, user_id: Uuid) -> Result<i64, CoordinationError> {
        self.counter(keys::timeouts(match_id, user_id)).await
    }

    pub async fn clear_strikes(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CoordinationError> {
        self.store.delete(&[keys::timeouts(match_id, user_id)]).await
    }

    pub async fn mark_disconnected(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), CoordinationError> {
        self.store
            .set(
                &keys::disconnect(match_id, user_id),
                &at.timestamp_millis().to_string(),
                self.rules.disconnect_ttl(),
            )
            .await
    }

    pub async fn disconnected_at(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, CoordinationError> {
        let key = keys::disconnect(match_id, user_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        raw.parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(Some)
            .ok_or(CoordinationError::Corrupt { key, value: raw })
    }

    pub async fn clear_disconnected(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CoordinationError> {
        self.store.delete(&[keys::disconnect(match_id, user_id)]).await
    }

    pub async fn clear_match(
        &self,
        match_id: Uuid,
        users: &[Uuid],
    ) -> Result<(), CoordinationError> {
        self.store.delete(&keys::all_for_match(match_id, users)).await
    }

    async fn counter(&self, key: String) -> Result<i64, CoordinationError> {
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| CoordinationError::Corrupt { key, value: raw }),
        }
    }
}
