//! Player notifications.
//!
//! Delivery is best effort and happens after the state change it reports has
//! been committed; a failed notification never undoes a settlement.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::entity::notifications;
use crate::tokio_tools::spawn_detached;

const LOG_TARGET: &str = "notify";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    GameWon,
    GameLost,
}

impl NotificationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            NotificationKind::GameWon => "GAME_WON",
            NotificationKind::GameLost => "GAME_LOST",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub reference_type: String,
    pub reference_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the `notifications` table.
pub struct StoredNotifier {
    connection: DatabaseConnection,
}

impl StoredNotifier {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Notifier for StoredNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let model = notifications::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(notification.user_id),
            title: Set(notification.title),
            body: Set(notification.body),
            kind: Set(notification.kind.as_str().to_owned()),
            reference_type: Set(Some(notification.reference_type)),
            reference_id: Set(Some(notification.reference_id)),
            is_read: Set(false),
            created_at: Set(Utc::now()),
        };
        model.insert(&self.connection).await?;
        Ok(())
    }
}

/// Emits notifications as log lines; used when no database is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            target = LOG_TARGET,
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            reference_id = %notification.reference_id,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}

/// Fire-and-forget delivery; failures are logged and dropped.
pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    let user_id = notification.user_id;
    spawn_detached("notify", async move {
        notifier
            .notify(notification)
            .await
            .map_err(|err| format!("notification for {user_id} failed: {err}"))
    });
}
