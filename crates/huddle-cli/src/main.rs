//! Huddle terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Join room 7 as user 42 against a local backend
//! huddle --user 42 --room 7
//!
//! # Custom endpoints with a bearer token
//! huddle --ws-url wss://chat.example.com/ws --api-url https://chat.example.com \
//!     --token "$TOKEN" --user 42
//! ```
//!
//! Type `/help` for commands. Logs go to stderr.

use clap::Parser;
use huddle_cli::{LineDriver, Runtime};
use huddle_client::{
    SessionConfig,
    transport::{ApiClient, LinkConfig, SystemEnv},
};
use huddle_proto::{RoomId, UserId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle room chat client
#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Terminal client for Huddle chat rooms")]
#[command(version)]
struct Args {
    /// WebSocket endpoint of the message broker
    #[arg(long, default_value = "ws://localhost:8080/ws")]
    ws_url: String,

    /// Base URL of the HTTP API
    #[arg(long, default_value = "http://localhost:8080")]
    api_url: String,

    /// Bearer token for the broker and the API
    #[arg(long)]
    token: Option<String>,

    /// Your user id
    #[arg(short, long)]
    user: UserId,

    /// Room to open on start
    #[arg(short, long)]
    room: Option<RoomId>,

    /// Messages per history page
    #[arg(long, default_value = "20")]
    page_size: usize,

    /// Retries after a lost link before giving up
    #[arg(long, default_value = "5")]
    max_retries: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut link_config = LinkConfig::new(&args.ws_url);
    let mut api = ApiClient::new(&args.api_url);
    if let Some(token) = &args.token {
        link_config = link_config.with_token(token);
        api = api.with_token(token);
    }

    let mut config = SessionConfig::new(args.user);
    config.page_size = args.page_size;
    config.reconnect.max_attempts = args.max_retries;

    tracing::info!(user = args.user, ws = %args.ws_url, api = %args.api_url, "huddle starting");

    let driver = LineDriver::new(link_config, api);
    let mut runtime = Runtime::new(driver, SystemEnv::new(), config);
    if let Some(room_id) = args.room {
        runtime.open_room(room_id).await?;
    }

    Ok(runtime.run().await?)
}
