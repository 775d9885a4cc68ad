use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::engine::ludo::UserId;
use crate::matches::types::MatchId;

use super::protocol::ServerEvent;

const LOG_TARGET: &str = "realtime::rooms";
const OUTBOX_CAPACITY: usize = 128;

pub type ConnectionId = Uuid;

/// Outbound push seam used by the match service.
///
/// Delivery is fire-and-forget; a slow or gone client never blocks a match.
pub trait Broadcaster: Send + Sync {
    fn to_match(&self, match_id: MatchId, event: ServerEvent);
    fn to_user(&self, user_id: UserId, event: ServerEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn to_match(&self, _match_id: MatchId, _event: ServerEvent) {}
    fn to_user(&self, _user_id: UserId, _event: ServerEvent) {}
}

struct Connection {
    user_id: UserId,
    outbox: mpsc::Sender<ServerEvent>,
}

/// Connection registry and match rooms for this process.
#[derive(Default)]
pub struct RoomHub {
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<MatchId, HashSet<ConnectionId>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: UserId) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        let connection_id = Uuid::new_v4();
        self.connections
            .insert(connection_id, Connection { user_id, outbox });
        tracing::debug!(target = LOG_TARGET, %connection_id, %user_id, "connection registered");
        (connection_id, inbox)
    }

    /// Drops the connection and returns the rooms it was in.
    pub fn unregister(&self, connection_id: ConnectionId) -> Vec<MatchId> {
        self.connections.remove(&connection_id);
        let mut left = Vec::new();
        self.rooms.retain(|match_id, members| {
            if members.remove(&connection_id) {
                left.push(*match_id);
            }
            !members.is_empty()
        });
        left
    }

    pub fn join(&self, connection_id: ConnectionId, match_id: MatchId) {
        self.rooms
            .entry(match_id)
            .or_default()
            .insert(connection_id);
    }

    pub fn room_size(&self, match_id: MatchId) -> usize {
        self.rooms.get(&match_id).map_or(0, |members| members.len())
    }

    pub fn is_user_connected(&self, user_id: UserId) -> bool {
        self.connections
            .iter()
            .any(|entry| entry.value().user_id == user_id)
    }

    pub fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&connection_id) {
            deliver(connection_id, &connection, event);
        }
    }
}

fn deliver(connection_id: ConnectionId, connection: &Connection, event: ServerEvent) {
    match connection.outbox.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::warn!(
                target = LOG_TARGET,
                %connection_id,
                user_id = %connection.user_id,
                event = event.name(),
                "outbox full; dropping event"
            );
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

impl Broadcaster for RoomHub {
    fn to_match(&self, match_id: MatchId, event: ServerEvent) {
        let Some(members) = self.rooms.get(&match_id) else {
            return;
        };
        let members: Vec<ConnectionId> = members.iter().copied().collect();
        for connection_id in members {
            if let Some(connection) = self.connections.get(&connection_id) {
                deliver(connection_id, &connection, event.clone());
            }
        }
    }

    fn to_user(&self, user_id: UserId, event: ServerEvent) {
        for entry in self.connections.iter() {
            if entry.value().user_id == user_id {
                deliver(*entry.key(), entry.value(), event.clone());
            }
        }
    }
}
