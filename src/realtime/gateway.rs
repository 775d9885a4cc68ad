//! WebSocket gateway.
//!
//! A socket authenticates once during the upgrade. Afterwards every text frame
//! is a [`ClientEvent`] routed to the match service; replies and room pushes
//! travel back through the connection's outbox in [`RoomHub`].

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::engine::ludo::UserId;
use crate::matches::{MatchError, MatchService};
use crate::tokio_tools::spawn_named_task;

use super::auth::{bearer_token, AuthError, AuthenticatedUser, Authenticator};
use super::protocol::{ClientEvent, ServerEvent};
use super::rooms::{ConnectionId, RoomHub};

const LOG_TARGET: &str = "realtime::gateway";

#[derive(Clone)]
pub struct Gateway {
    service: Arc<dyn MatchService>,
    hub: Arc<RoomHub>,
    auth: Arc<Authenticator>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    token: Option<String>,
}

impl Gateway {
    pub fn new(
        service: Arc<dyn MatchService>,
        hub: Arc<RoomHub>,
        auth: Arc<Authenticator>,
    ) -> Self {
        Self { service, hub, auth }
    }

    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    async fn serve(self, socket: WebSocket, user: AuthenticatedUser) {
        let (connection_id, mut outbox) = self.hub.register(user.user_id);
        let (mut sink, mut frames) = socket.split();
        tracing::info!(target = LOG_TARGET, %connection_id, user_id = %user.user_id, "socket connected");

        let writer = spawn_named_task(format!("ws-writer-{connection_id}"), async move {
            while let Some(event) = outbox.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(target = LOG_TARGET, %connection_id, error = %err, "failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = frames.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(err) => {
                    tracing::debug!(target = LOG_TARGET, %connection_id, error = %err, "socket read failed");
                    break;
                }
            };
            match message {
                Message::Text(text) => self.on_text(connection_id, user.user_id, &text).await,
                Message::Binary(_) => self.hub.send_to_connection(
                    connection_id,
                    ServerEvent::error("binary frames are not supported"),
                ),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }

        writer.abort();
        self.disconnect(connection_id, user.user_id).await;
    }

    async fn on_text(&self, connection_id: ConnectionId, user_id: UserId, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(target = LOG_TARGET, %connection_id, error = %err, "malformed frame");
                self.hub
                    .send_to_connection(connection_id, ServerEvent::error("Invalid message"));
                return;
            }
        };

        let action = event.name();
        let match_id = event.match_id();
        match self.handle_event(connection_id, user_id, event).await {
            Ok(()) => self.hub.send_to_connection(
                connection_id,
                ServerEvent::Ack {
                    action: action.to_owned(),
                    match_id,
                },
            ),
            Err(err) => {
                if err.is_user_facing() {
                    tracing::debug!(target = LOG_TARGET, %match_id, %user_id, action, error = %err, "event rejected");
                } else {
                    tracing::error!(target = LOG_TARGET, %match_id, %user_id, action, error = %err, "event failed");
                }
                self.hub
                    .send_to_connection(connection_id, ServerEvent::error(err.public_message()));
            }
        }
    }

    /// Routes one client event to the service.
    pub async fn handle_event(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        event: ClientEvent,
    ) -> Result<(), MatchError> {
        match event {
            ClientEvent::JoinMatch { match_id } => {
                if !self.service.is_participant(match_id, user_id).await? {
                    return Err(MatchError::forbidden("Not a participant in this match"));
                }
                self.hub.join(connection_id, match_id);
                self.service.player_reconnected(user_id, match_id).await?;
                let snapshot = self.service.match_state(match_id).await?;
                self.hub
                    .send_to_connection(connection_id, ServerEvent::MatchState(snapshot));
            }
            ClientEvent::RollDice { match_id } => {
                self.service.roll_dice(user_id, match_id).await?;
            }
            ClientEvent::MovePiece { match_id, piece_id } => {
                self.service.move_piece(user_id, match_id, piece_id).await?;
            }
            ClientEvent::EmojiReaction { match_id, emoji } => {
                self.service.react(user_id, match_id, emoji).await?;
            }
        }
        Ok(())
    }

    /// Drops the connection; the user only counts as gone once their last socket closes.
    pub async fn disconnect(&self, connection_id: ConnectionId, user_id: UserId) {
        self.hub.unregister(connection_id);
        tracing::info!(target = LOG_TARGET, %connection_id, %user_id, "socket closed");
        if self.hub.is_user_connected(user_id) {
            return;
        }
        if let Err(err) = self.service.player_disconnected(user_id).await {
            tracing::warn!(target = LOG_TARGET, %user_id, error = %err, "disconnect bookkeeping failed");
        }
    }
}

pub async fn ws_handler(
    State(gateway): State<Gateway>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Response {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .unwrap_or_default();

    let authenticated = gateway.auth.authenticate(token).await;
    match authenticated {
        Ok(user) => upgrade.on_upgrade(move |socket| gateway.serve(socket, user)),
        Err(AuthError::Storage(err)) => {
            tracing::error!(target = LOG_TARGET, error = %err, "socket authentication failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            tracing::debug!(target = LOG_TARGET, error = %err, "socket refused");
            (StatusCode::UNAUTHORIZED, err.to_string()).into_response()
        }
    }
}
