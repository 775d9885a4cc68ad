//! Common test utilities for match and realtime tests

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::engine::ludo::{DiceSource, DiceValue, UserId};
use crate::matches::types::MatchId;
use crate::notify::{Notification, Notifier, NotifyError};
use crate::realtime::protocol::ServerEvent;
use crate::realtime::rooms::Broadcaster;

/// Helpers shared across test modules.
pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value)
            .expect("serialization should succeed during round-trip testing");
        let restored: T = serde_json::from_str(&json)
            .expect("deserialization should succeed during round-trip testing");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }
}

/// Dice that replay a fixed script, then fall back to `fallback`.
pub struct ScriptedDice {
    script: Mutex<VecDeque<DiceValue>>,
    fallback: DiceValue,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = DiceValue>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(rolls.into_iter().collect()),
            fallback: 1,
        })
    }

    pub fn push(&self, rolls: impl IntoIterator<Item = DiceValue>) {
        self.script.lock().extend(rolls);
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&self) -> DiceValue {
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    Match(MatchId, ServerEvent),
    User(UserId, ServerEvent),
}

impl Delivery {
    pub fn event(&self) -> &ServerEvent {
        match self {
            Delivery::Match(_, event) | Delivery::User(_, event) => event,
        }
    }
}

/// Captures every push instead of sending it.
#[derive(Default)]
pub struct RecordingBroadcaster {
    sent: Mutex<Vec<Delivery>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.sent.lock().clone()
    }

    /// Names of events pushed to the match room, oldest first.
    pub fn room_events(&self, match_id: MatchId) -> Vec<&'static str> {
        self.sent
            .lock()
            .iter()
            .filter_map(|delivery| match delivery {
                Delivery::Match(id, event) if *id == match_id => Some(event.name()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn to_match(&self, match_id: MatchId, event: ServerEvent) {
        self.sent.lock().push(Delivery::Match(match_id, event));
    }

    fn to_user(&self, user_id: UserId, event: ServerEvent) {
        self.sent.lock().push(Delivery::User(user_id, event));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification);
        Ok(())
    }
}
