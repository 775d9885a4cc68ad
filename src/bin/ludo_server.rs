use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use ludo_arena::config::MatchRules;
use ludo_arena::server::{run_server, CoordinationBackend, ServerConfig};

const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Parser)]
#[command(name = "ludo_server")]
#[command(about = "Serve real-money Ludo matches over HTTP and WebSocket", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// SeaORM-compatible Postgres URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// HS256 secret shared with the account service
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    json: bool,

    /// Coordination key store: `memory` or `database`
    #[arg(long, env = "COORDINATION_BACKEND", default_value = "database")]
    coordination_backend: CoordinationBackend,

    /// Seconds a player has to act before a strike
    #[arg(long, env = "TURN_TIMEOUT_SECS", default_value_t = 30)]
    turn_timeout_secs: u64,

    /// Seconds a disconnected player has to come back
    #[arg(long, env = "RECONNECT_WINDOW_SECS", default_value_t = 60)]
    reconnect_window_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    run_server(build_config(args)).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn build_config(args: Args) -> ServerConfig {
    let rules = MatchRules {
        turn_timeout: Duration::from_secs(args.turn_timeout_secs),
        reconnect_window: Duration::from_secs(args.reconnect_window_secs),
        ..MatchRules::default()
    };

    ServerConfig {
        bind: args.bind,
        database_url: args.database_url,
        jwt_secret: args.jwt_secret,
        coordination: args.coordination_backend,
        rules,
    }
}
