//! # podterm Gateway Library
//!
//! This crate provides the gateway that exposes interactive terminals and
//! log streams of cluster containers over WebSockets.
//!
//! ## Overview
//!
//! - **Sessions**: A REST call registers a pending terminal session and returns
//!   an unguessable token; the client binds a socket to it with that token
//! - **Exec**: Shells are started through a pluggable transport, `kubectl exec`
//!   by default, with a fixed shell fallback order
//! - **Network**: axum routes for starting terminals, the terminal socket, the
//!   log socket and health
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Gateway Orchestrator                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐   │
//! │  │   Session    │  │   Session    │  │    Bind Waiters      │   │
//! │  │   Registry   │  │   Factory    │  │  (one per session)   │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘   │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │        Process Attacher  ──►  Exec Transport (kubectl)    │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                                                                 │
//! │  ┌───────────────────┐  ┌───────────────────────────────────┐   │
//! │  │  Terminal Socket  │  │   Log Socket (Stream Adapter)     │   │
//! │  └───────────────────┘  └───────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gateway::{Config, GatewayOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let orchestrator = GatewayOrchestrator::new(config)?;
//!     orchestrator.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Session registry, factory, bind waiter and PTY bridge
//! - [`exec`]: Exec transport, shell policy and the kubectl backend
//! - [`network`]: HTTP routes and WebSocket handlers
//! - [`orchestrator`]: Main gateway coordinator

pub mod config;
pub mod exec;
pub mod network;
pub mod orchestrator;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export session types for convenience
pub use session::{
    PtyBridge, Session, SessionError, SessionFactory, SessionId, SessionRegistry, SessionState,
    WaiterOutcome,
};

// Re-export exec types for convenience
pub use exec::{
    ExecTarget, ExecTransport, KubectlTransport, LogOptions, LogSource, ProcessAttacher, Shell,
    TransportError,
};

// Re-export network types for convenience
pub use network::{router, ApiError, AppState, ConnectionLimits, StreamAdapter};

// Re-export orchestrator types for convenience
pub use orchestrator::{GatewayOrchestrator, OrchestratorState};
