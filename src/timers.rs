//! Process-local, cancellable one-shot timers.
//!
//! At most one timer is armed per key; arming again replaces (and aborts) the
//! previous one. Callbacks must re-validate persisted state when they fire,
//! since a timer can lose a race with the action it guards. Matches therefore
//! need to be pinned to the process that armed their timers.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::tokio_tools::spawn_named_task;

const LOG_TARGET: &str = "timers";

struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct TimerTable<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    name: &'static str,
    armed: Arc<DashMap<K, Armed>>,
    generation: AtomicU64,
}

impl<K> TimerTable<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            armed: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Runs `on_fire` after `delay` unless cancelled or re-armed first.
    pub fn arm<F>(&self, key: K, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let armed = Arc::clone(&self.armed);
        let fired_key = key.clone();
        let handle = spawn_named_task(format!("{}-timer", self.name), async move {
            tokio::time::sleep(delay).await;
            // Only forget the slot if nobody re-armed it meanwhile.
            armed.remove_if(&fired_key, |_, current| current.generation == generation);
            on_fire.await;
        });

        if let Some(previous) = self.armed.insert(key.clone(), Armed { generation, handle }) {
            previous.handle.abort();
        }
        self.armed.remove_if(&key, |_, current| {
            current.generation == generation && current.handle.is_finished()
        });
        tracing::debug!(
            target = LOG_TARGET,
            table = self.name,
            ?key,
            delay_ms = delay.as_millis() as u64,
            "timer armed"
        );
    }

    /// Returns whether a timer was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.armed.remove(key) {
            Some((_, previous)) => {
                previous.handle.abort();
                tracing::debug!(target = LOG_TARGET, table = self.name, ?key, "timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl<K> Drop for TimerTable<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn drop(&mut self) {
        for entry in self.armed.iter() {
            entry.value().handle.abort();
        }
    }
}

/// One turn timer per match.
pub type TurnTimers = TimerTable<Uuid>;

/// One reconnect timer per (match, user).
pub type ReconnectTimers = TimerTable<(Uuid, Uuid)>;
