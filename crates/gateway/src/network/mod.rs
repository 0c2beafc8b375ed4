//! HTTP and WebSocket surface of the gateway.
//!
//! - REST: start a terminal, health
//! - `/api/v1/terminal/ws`: the bidirectional terminal socket
//! - `/api/v1/log/.../ws`: one-directional container log stream

pub mod error;
pub mod logs;
pub mod rest;
pub mod stream;
pub mod terminal;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::exec::LogSource;
use crate::session::{SessionFactory, SessionRegistry};

pub use error::ApiError;
pub use stream::StreamAdapter;

/// Frames buffered towards a single socket.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Largest accepted WebSocket message.
    pub max_message_bytes: usize,
    /// Keystroke frames buffered towards the shell.
    pub stdin_queue_capacity: usize,
    /// Frames buffered towards the client.
    pub outbound_queue_capacity: usize,
}

impl From<&Config> for ConnectionLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_message_bytes: config.server.max_message_bytes,
            stdin_queue_capacity: config.session.stdin_queue_capacity,
            outbound_queue_capacity: OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub factory: SessionFactory,
    pub logs: Arc<dyn LogSource>,
    pub limits: ConnectionLimits,
    pub shutdown: CancellationToken,
}

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(rest::healthz))
        .route(
            "/api/v1/pod/{namespace}/{pod}/shell/{container}",
            get(rest::start_terminal),
        )
        .route(
            "/api/v1/pod/{namespace}/{pod}/shell",
            get(rest::missing_container),
        )
        .route("/api/v1/terminal/ws", get(terminal::terminal_socket))
        .route(
            "/api/v1/log/{namespace}/{pod}/{container}/ws",
            get(logs::log_socket),
        )
        .fallback(rest::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
