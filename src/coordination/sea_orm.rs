use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter, Set,
    Statement,
};

use crate::db::entity::coordination_keys;

use super::{CoordinationError, CoordinationStore};

const INCR_SQL: &str = r#"
INSERT INTO coordination_keys (key, value, expires_at)
VALUES ($1, '1', $2)
ON CONFLICT (key) DO UPDATE
SET value = CASE
        WHEN coordination_keys.expires_at > NOW()
            THEN (coordination_keys.value::BIGINT + 1)::TEXT
        ELSE '1'
    END,
    expires_at = EXCLUDED.expires_at
RETURNING value
"#;

/// Postgres-backed store so every server process sees the same flags and counters.
pub struct SeaOrmCoordinationStore {
    connection: DatabaseConnection,
}

impl SeaOrmCoordinationStore {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

fn expiry(ttl: Duration) -> chrono::DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(1));
    Utc::now() + ttl
}

#[async_trait]
impl CoordinationStore for SeaOrmCoordinationStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinationError> {
        let row = coordination_keys::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            expires_at: Set(expiry(ttl)),
        };
        coordination_keys::Entity::insert(row)
            .on_conflict(
                OnConflict::column(coordination_keys::Column::Key)
                    .update_columns([
                        coordination_keys::Column::Value,
                        coordination_keys::Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.connection)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let row = coordination_keys::Entity::find_by_id(key.to_string())
            .filter(coordination_keys::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.connection)
            .await?;
        Ok(row.map(|model| model.value))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CoordinationError> {
        if keys.is_empty() {
            return Ok(());
        }
        coordination_keys::Entity::delete_many()
            .filter(coordination_keys::Column::Key.is_in(keys.iter().cloned()))
            .exec(&self.connection)
            .await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CoordinationError> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            INCR_SQL,
            [key.into(), expiry(ttl).into()],
        );
        let row = self
            .connection
            .query_one(statement)
            .await?
            .ok_or_else(|| CoordinationError::Corrupt {
                key: key.to_string(),
                value: "<no row returned>".to_string(),
            })?;
        let value: String = row.try_get("", "value")?;
        value
            .parse::<i64>()
            .map_err(|_| CoordinationError::Corrupt {
                key: key.to_string(),
                value,
            })
    }

    async fn purge_expired(&self) -> Result<u64, CoordinationError> {
        let result = coordination_keys::Entity::delete_many()
            .filter(coordination_keys::Column::ExpiresAt.lte(Utc::now()))
            .exec(&self.connection)
            .await?;
        Ok(result.rows_affected)
    }
}
