use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::MatchRules;
use crate::coordination::{
    spawn_sweeper, CoordinationStore, InMemoryCoordinationStore, SeaOrmCoordinationStore,
};
use crate::db::connect_with;
use crate::engine::ludo::SecureDice;
use crate::matches::{MatchLifecycle, MatchLifecycleParts, MatchService, SeaOrmMatchStorage};
use crate::notify::StoredNotifier;
use crate::realtime::{Authenticator, Gateway, RoomHub};

use super::routes::{AppState, LudoServer};

const LOG_TARGET: &str = "server::bootstrap";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Where the TTL'd coordination keys live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinationBackend {
    /// Process-local; only safe with a single server instance.
    Memory,
    /// Shared table in the match database.
    Database,
}

impl FromStr for CoordinationBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "database" | "db" => Ok(Self::Database),
            other => Err(anyhow!("unknown coordination backend {other:?}")),
        }
    }
}

pub struct ServerConfig {
    pub bind: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub coordination: CoordinationBackend,
    pub rules: MatchRules,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let db = connect_with(&config.database_url).await?;

    let coordination: Arc<dyn CoordinationStore> = match config.coordination {
        CoordinationBackend::Memory => {
            warn!(target = LOG_TARGET, "using process-local coordination store");
            Arc::new(InMemoryCoordinationStore::new())
        }
        CoordinationBackend::Database => Arc::new(SeaOrmCoordinationStore::new(db.clone())),
    };

    let hub = Arc::new(RoomHub::new());
    let lifecycle = MatchLifecycle::new(MatchLifecycleParts::from_sea_orm(
        db.clone(),
        Arc::clone(&coordination),
        hub.clone(),
        Arc::new(StoredNotifier::new(db.clone())),
        Arc::new(SecureDice),
        config.rules,
    ));

    let resumed = lifecycle
        .resume_turn_timers()
        .await
        .context("failed to resume turn timers")?;
    info!(target = LOG_TARGET, resumed, "turn timers resumed");

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(Arc::clone(&coordination), SWEEP_INTERVAL, shutdown.clone());

    let service: Arc<dyn MatchService> = lifecycle;
    let auth = Arc::new(Authenticator::new(
        config.jwt_secret.as_bytes(),
        Arc::new(SeaOrmMatchStorage::new(db)),
    ));
    let gateway = Gateway::new(Arc::clone(&service), hub, Arc::clone(&auth));
    let router = LudoServer::new(AppState {
        service,
        auth,
        gateway,
    })
    .into_router();

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(
        target = LOG_TARGET,
        %local_addr,
        coordination = ?config.coordination,
        "ludo server listening"
    );

    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error");

    shutdown.cancel();
    if let Err(err) = sweeper.await {
        warn!(target = LOG_TARGET, error = %err, "coordination sweeper ended abnormally");
    }
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = LOG_TARGET,
            error = %err,
            "failed to install ctrl-c handler"
        );
    }
    info!(target = LOG_TARGET, "shutdown signal received");
}
