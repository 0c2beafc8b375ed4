//! Gateway orchestrator for wiring together all components.
//!
//! This module provides the `GatewayOrchestrator` that builds the session
//! registry, the session factory, the exec and log backends and the HTTP
//! router, and runs the server until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::exec::{ExecTransport, KubectlTransport, LogSource, ProcessAttacher};
use crate::network::{self, AppState, ConnectionLimits};
use crate::session::{SessionFactory, SessionRegistry, SessionSettings};

/// Gateway orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Not serving.
    Stopped,
    /// Accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Owns every gateway subsystem.
pub struct GatewayOrchestrator {
    /// Configuration.
    config: Config,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Live terminal sessions.
    registry: SessionRegistry,
    /// Creates sessions and their waiters.
    factory: SessionFactory,
    /// Container log backend.
    logs: Arc<dyn LogSource>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl GatewayOrchestrator {
    /// Creates an orchestrator backed by `kubectl`.
    pub fn new(config: Config) -> Result<Self> {
        let kubectl = Arc::new(KubectlTransport::from_config(&config.kubectl));
        info!(binary = %config.kubectl.binary, "Using kubectl transport");
        Self::with_backends(config, kubectl.clone(), kubectl)
    }

    /// Creates an orchestrator with custom exec and log backends.
    pub fn with_backends(
        config: Config,
        transport: Arc<dyn ExecTransport>,
        logs: Arc<dyn LogSource>,
    ) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let registry = SessionRegistry::new();
        let shutdown_token = CancellationToken::new();
        let attacher = Arc::new(ProcessAttacher::new(transport));
        let factory = SessionFactory::new(
            registry.clone(),
            attacher,
            SessionSettings::from(&config.session),
            shutdown_token.clone(),
        );

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            registry,
            factory,
            logs,
            shutdown_token,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Builds the HTTP router over the orchestrator's state.
    pub fn router(&self) -> Router {
        network::router(AppState {
            registry: self.registry.clone(),
            factory: self.factory.clone(),
            logs: Arc::clone(&self.logs),
            limits: ConnectionLimits::from(&self.config),
            shutdown: self.shutdown_token.clone(),
        })
    }

    /// Binds the configured listen address and serves until shutdown.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.config.server.listen_addr))?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        self.serve(listener).await
    }

    /// Serves on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Gateway is already running");
            }
            *state = OrchestratorState::Running;
        }

        let addr = listener.local_addr().context("Failed to read local address")?;
        info!(addr = %addr, "Gateway listening");

        let shutdown = self.shutdown_token.clone();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("Server error");

        *self.state.write().await = OrchestratorState::Stopped;

        let remaining = self.registry.len();
        if remaining > 0 {
            warn!(sessions = remaining, "Sessions still registered after shutdown");
        }
        info!("Gateway stopped");
        result
    }

    /// Signals every task to stop.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            if *state == OrchestratorState::Running {
                *state = OrchestratorState::ShuttingDown;
            }
        }
        info!("Stopping gateway...");
        self.shutdown_token.cancel();
    }
}
