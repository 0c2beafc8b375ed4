//! Terminal session creation.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::SessionRegistry;
use super::state::{Session, SessionError, SessionId};
use super::waiter::{BindWaiter, WaiterOutcome};
use crate::config::SessionConfig;
use crate::exec::{ExecTarget, ProcessAttacher};

/// Random bytes in a session token.
const TOKEN_BYTES: usize = 16;

/// Limits applied to new sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// How long a session waits for a client to bind.
    pub bind_timeout: Duration,
    /// Maximum number of sessions in the registry.
    pub max_sessions: usize,
    /// Bound of each session's resize queue.
    pub resize_queue_capacity: usize,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            bind_timeout: config.bind_timeout(),
            max_sessions: config.max_sessions,
            resize_queue_capacity: config.resize_queue_capacity,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// A freshly started terminal.
#[derive(Debug)]
pub struct StartedTerminal {
    /// Token the client binds with.
    pub id: SessionId,
    /// The session's waiter task.
    pub waiter: JoinHandle<WaiterOutcome>,
}

/// Creates pending sessions and their waiters.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    registry: SessionRegistry,
    attacher: Arc<ProcessAttacher>,
    settings: SessionSettings,
    shutdown: CancellationToken,
}

impl SessionFactory {
    pub fn new(
        registry: SessionRegistry,
        attacher: Arc<ProcessAttacher>,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            attacher,
            settings,
            shutdown,
        }
    }

    /// Returns the registry sessions are added to.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Registers a pending terminal for `target` and starts its waiter.
    ///
    /// Nothing is opened against the cluster until a client binds.
    pub fn start_terminal(
        &self,
        target: ExecTarget,
        shell_hint: Option<String>,
    ) -> Result<StartedTerminal, SessionError> {
        let id = generate_session_id();
        let shell_hint = shell_hint.filter(|hint| !hint.is_empty());

        let (bind_tx, bind_rx) = oneshot::channel();
        let (resize_tx, resize_rx) = mpsc::channel(self.settings.resize_queue_capacity);
        let session = Arc::new(Session::new(
            id.clone(),
            target,
            shell_hint,
            bind_tx,
            resize_tx,
        ));
        if let Err(e) = self
            .registry
            .insert_new(Arc::clone(&session), self.settings.max_sessions)
        {
            if let SessionError::CapacityExceeded(max_sessions) = e {
                tracing::warn!(max_sessions, "Session limit reached");
            }
            return Err(e);
        }

        tracing::info!(
            session_id = %id,
            target = %session.target(),
            shell_hint = ?session.shell_hint(),
            "Terminal session created"
        );

        let waiter = BindWaiter {
            session,
            registry: self.registry.clone(),
            attacher: Arc::clone(&self.attacher),
            bind_rx,
            resize_rx,
            timeout: self.settings.bind_timeout,
            shutdown: self.shutdown.child_token(),
        };
        let waiter = tokio::spawn(waiter.run());

        Ok(StartedTerminal { id, waiter })
    }
}

/// Generates a 128-bit random token, hex-encoded.
pub fn generate_session_id() -> SessionId {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
