//! Coach Survey Backend
//!
//! - Axum HTTP API for the coding-coach user study
//! - Session state machine with per-phase timers
//! - Python sandbox for running participant code
//! - Optional assistant model + upstream mirroring (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   OPENAI_API_KEY     : enables the assistant model if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_MODEL       : default "gpt-4o-mini"
//!   UPSTREAM_BASE_URL  : enables mirroring submissions to the research store
//!   COACH_CONFIG_PATH  : path to TOML config (prompts + timer ceilings)
//!   COACH_DATA_DIR     : snapshot directory (default ./data)
//!   PYTHON_BIN         : sandbox interpreter (default "python3")
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod catalog;
mod timer;
mod session;
mod sandbox;
mod upstream;
mod assistant;
mod persist;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, time::Duration};

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // Build shared application state (session store, catalog, clients) and
    // restore any persisted session snapshots.
    let state = AppState::new()?;

    // Drive every live session's clock once per second. Sessions removed
    // from the store simply stop being ticked.
    let ticker_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            ticker_state.tick_all().await;
        }
    });

    // Build the HTTP router with routes, CORS and tracing layers.
    let app = build_router(state);

    // Read port from env or default to 3000.
    let addr: SocketAddr = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

    let listener = TcpListener::bind(addr).await?;
    info!(target: "coach_backend", %addr, "HTTP server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolve on Ctrl-C so in-flight requests finish their snapshot writes
/// before the process exits.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(target: "coach_backend", "Shutdown signal received");
    }
}
