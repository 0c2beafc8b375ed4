//! Session state.
//!
//! A [`Session`] is one terminal attempt. It is created pending, becomes
//! bound when a socket sends a matching `bind`, runs while the remote
//! process is alive, and ends closed.

use parking_lot::Mutex;
use protocol::{TerminalMessage, TerminalSize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::exec::ExecTarget;

/// Opaque session token.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session was not found.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// A socket is already bound to the session.
    #[error("session already bound: {0}")]
    AlreadyBound(SessionId),

    /// The session has already been closed.
    #[error("session closed: {0}")]
    Closed(SessionId),

    /// The registry is full.
    #[error("session limit of {0} reached")]
    CapacityExceeded(usize),

    /// The client connection is gone.
    #[error("connection closed for session {0}")]
    ConnectionClosed(SessionId),
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, waiting for a client to bind.
    Pending,
    /// A client is bound; the process is not started yet.
    Bound,
    /// The remote process is attached.
    Running,
    /// Finished, timed out or torn down.
    Closed,
}

/// The gateway side of a bound socket, handed to the session's waiter.
///
/// The socket itself stays with the gateway; this only carries the
/// channels into and out of it.
#[derive(Debug)]
pub struct Connection {
    /// Identifier of the socket, for logs.
    pub conn_id: Uuid,
    /// Keystrokes read from the socket.
    pub stdin: mpsc::Receiver<String>,
    /// Frames to write to the socket.
    pub outbound: mpsc::Sender<TerminalMessage>,
    /// Cancelled once the socket is gone.
    pub closed: CancellationToken,
}

/// A terminal session held in the registry.
pub struct Session {
    id: SessionId,
    target: ExecTarget,
    shell_hint: Option<String>,
    state: watch::Sender<SessionState>,
    /// Taken by the first bind; `None` afterwards.
    bind_tx: Mutex<Option<oneshot::Sender<Connection>>>,
    resize_tx: mpsc::Sender<TerminalSize>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        target: ExecTarget,
        shell_hint: Option<String>,
        bind_tx: oneshot::Sender<Connection>,
        resize_tx: mpsc::Sender<TerminalSize>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Pending);
        Self {
            id,
            target,
            shell_hint,
            state,
            bind_tx: Mutex::new(Some(bind_tx)),
            resize_tx,
        }
    }

    /// Returns the session token.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Returns the target container.
    pub fn target(&self) -> &ExecTarget {
        &self.target
    }

    /// Returns the shell requested at start, if any.
    pub fn shell_hint(&self) -> Option<&str> {
        self.shell_hint.as_deref()
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Subscribes to state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Attaches a connection and resolves the bind signal.
    ///
    /// Only the first call can succeed. The connection is dropped on error,
    /// which the gateway observes as its outbound channel closing.
    pub fn bind(&self, connection: Connection) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id.clone()));
        }

        let bind_tx = self
            .bind_tx
            .lock()
            .take()
            .ok_or_else(|| SessionError::AlreadyBound(self.id.clone()))?;

        // Fails only if the waiter already gave up on this session.
        bind_tx
            .send(connection)
            .map_err(|_| SessionError::Closed(self.id.clone()))?;

        self.advance(SessionState::Pending, SessionState::Bound);

        tracing::debug!(session_id = %self.id, "Session bound");
        Ok(())
    }

    /// Queues a resize for the remote terminal.
    ///
    /// Waits while the queue is full.
    pub async fn push_resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        self.resize_tx
            .send(size)
            .await
            .map_err(|_| SessionError::Closed(self.id.clone()))
    }

    /// Moves to `Running` unless the session was closed meanwhile.
    pub(crate) fn mark_running(&self) {
        self.state.send_if_modified(|state| match *state {
            SessionState::Pending | SessionState::Bound => {
                *state = SessionState::Running;
                true
            }
            SessionState::Running | SessionState::Closed => false,
        });
    }

    /// Moves to `Closed`. Returns false if it already was.
    ///
    /// A waiter still waiting for a bind sees its signal dropped.
    pub(crate) fn mark_closed(&self) -> bool {
        let previous = self.state.send_replace(SessionState::Closed);
        self.bind_tx.lock().take();
        previous != SessionState::Closed
    }

    fn advance(&self, from: SessionState, to: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("shell_hint", &self.shell_hint)
            .field("state", &self.state())
            .finish()
    }
}
