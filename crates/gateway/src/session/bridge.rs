//! The terminal seen by an exec transport.
//!
//! [`PtyBridge`] joins a bound client connection to a running remote
//! process. Keystrokes come out of [`PtyBridge::read`], resize events out of
//! [`PtyBridge::next_resize`], and process output goes in through
//! [`PtyBridge::write`]. Both reads report end-of-stream (`None`) once the
//! client is gone. The last size seen stays available through
//! [`PtyBridge::size`] for processes started later.

use parking_lot::Mutex as SyncMutex;
use protocol::{TerminalMessage, TerminalSize, Utf8Framer};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::{Connection, SessionError, SessionId};

/// Bidirectional terminal stream for one session.
#[derive(Debug)]
pub struct PtyBridge {
    session_id: SessionId,
    conn_id: Uuid,
    stdin: Mutex<mpsc::Receiver<String>>,
    resizes: Mutex<mpsc::Receiver<TerminalSize>>,
    outbound: mpsc::Sender<TerminalMessage>,
    closed: CancellationToken,
    framer: SyncMutex<Utf8Framer>,
    size: SyncMutex<TerminalSize>,
}

impl PtyBridge {
    /// Creates a bridge over a bound connection and the session's resize queue.
    pub fn new(
        session_id: SessionId,
        connection: Connection,
        resizes: mpsc::Receiver<TerminalSize>,
    ) -> Self {
        Self {
            session_id,
            conn_id: connection.conn_id,
            stdin: Mutex::new(connection.stdin),
            resizes: Mutex::new(resizes),
            outbound: connection.outbound,
            closed: connection.closed,
            framer: SyncMutex::new(Utf8Framer::new()),
            size: SyncMutex::new(TerminalSize::default()),
        }
    }

    /// Returns the session this bridge serves.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the id of the bound socket.
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Returns the most recent size taken from [`PtyBridge::next_resize`].
    pub fn size(&self) -> TerminalSize {
        *self.size.lock()
    }

    /// Returns whether the client connection is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.outbound.is_closed()
    }

    /// Waits for the next keystrokes from the client.
    ///
    /// Returns `None` once the client has disconnected.
    pub async fn read(&self) -> Option<Vec<u8>> {
        let mut stdin = self.stdin.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            data = stdin.recv() => data.map(String::into_bytes),
        }
    }

    /// Waits for the next terminal size change.
    ///
    /// Events come out in the order the client sent them. Returns `None`
    /// once the client has disconnected.
    pub async fn next_resize(&self) -> Option<TerminalSize> {
        let mut resizes = self.resizes.lock().await;
        let size = tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            size = resizes.recv() => size,
        };
        if let Some(size) = size {
            *self.size.lock() = size;
        }
        size
    }

    /// Forwards process output to the client as `stdout` frames.
    ///
    /// A multi-byte character split across writes is held back until the
    /// rest of it arrives.
    pub async fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        let text = self.framer.lock().push(data);
        match text {
            Some(text) => self.send(TerminalMessage::stdout(text)).await,
            None => Ok(()),
        }
    }

    /// Sends any held-back partial character.
    pub async fn flush(&self) -> Result<(), SessionError> {
        let text = self.framer.lock().finish();
        match text {
            Some(text) => self.send(TerminalMessage::stdout(text)).await,
            None => Ok(()),
        }
    }

    /// Sends an out-of-band notice to the client.
    pub async fn toast(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.send(TerminalMessage::toast(message)).await
    }

    async fn send(&self, message: TerminalMessage) -> Result<(), SessionError> {
        let closed = || SessionError::ConnectionClosed(self.session_id.clone());
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(closed()),
            sent = self.outbound.send(message) => sent.map_err(|_| closed()),
        }
    }
}
