//! In-memory exec transport for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use protocol::{TerminalMessage, TerminalSize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ExecTarget, ExecTransport, LogOptions, LogSource, LogStream, TransportError};
use crate::session::{Connection, PtyBridge};

/// A scripted container.
///
/// Only the listed shells exist. A running shell echoes stdin back as
/// output, records resizes, and exits when it reads `exit\n`.
#[derive(Debug, Default)]
pub struct FakeTransport {
    shells: Vec<String>,
    failure: Option<String>,
    attempts: Mutex<Vec<String>>,
    resizes: Mutex<Vec<TerminalSize>>,
}

impl FakeTransport {
    pub fn with_shells(shells: &[&str]) -> Self {
        Self {
            shells: shells.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    /// A transport that cannot reach the cluster at all.
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn resizes(&self) -> Vec<TerminalSize> {
        self.resizes.lock().clone()
    }
}

#[async_trait]
impl ExecTransport for FakeTransport {
    async fn exec(
        &self,
        _target: &ExecTarget,
        command: &[String],
        tty: &PtyBridge,
    ) -> Result<(), TransportError> {
        let shell = command.first().cloned().unwrap_or_default();
        self.attempts.lock().push(shell.clone());

        if let Some(reason) = &self.failure {
            return Err(TransportError::Establish(reason.clone()));
        }
        if !self.shells.contains(&shell) {
            return Err(TransportError::ShellUnavailable { shell });
        }

        loop {
            tokio::select! {
                biased;
                size = tty.next_resize() => match size {
                    Some(size) => self.resizes.lock().push(size),
                    None => return Err(TransportError::Disconnected),
                },
                input = tty.read() => match input {
                    Some(bytes) if bytes == b"exit\n" => return Ok(()),
                    Some(bytes) => tty
                        .write(&bytes)
                        .await
                        .map_err(|_| TransportError::Disconnected)?,
                    None => return Err(TransportError::Disconnected),
                },
            }
        }
    }
}

/// A log source that serves fixed text and records the options it was
/// opened with.
#[derive(Debug, Default)]
pub struct FakeLogSource {
    text: String,
    opened: Mutex<Vec<(String, LogOptions)>>,
}

impl FakeLogSource {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<(String, LogOptions)> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl LogSource for FakeLogSource {
    async fn open(
        &self,
        target: &ExecTarget,
        options: &LogOptions,
    ) -> Result<LogStream, TransportError> {
        self.opened.lock().push((target.to_string(), options.clone()));
        Ok(Box::new(std::io::Cursor::new(self.text.clone().into_bytes())))
    }
}

/// The client side of a bridge built by [`test_bridge`].
pub struct TestPeer {
    pub stdin: mpsc::Sender<String>,
    pub resizes: mpsc::Sender<TerminalSize>,
    pub outbound: mpsc::Receiver<TerminalMessage>,
    pub closed: CancellationToken,
}

impl TestPeer {
    pub async fn stdin(&mut self, data: &str) {
        self.stdin.send(data.to_string()).await.unwrap();
    }
}

/// Builds a bridge that is not backed by a socket.
pub fn test_bridge() -> (PtyBridge, TestPeer) {
    let (stdin_tx, stdin) = mpsc::channel(16);
    let (outbound, outbound_rx) = mpsc::channel(16);
    let (resize_tx, resize_rx) = mpsc::channel(4);
    let closed = CancellationToken::new();

    let connection = Connection {
        conn_id: Uuid::new_v4(),
        stdin,
        outbound,
        closed: closed.clone(),
    };
    let bridge = PtyBridge::new("test-session".to_string(), connection, resize_rx);

    let peer = TestPeer {
        stdin: stdin_tx,
        resizes: resize_tx,
        outbound: outbound_rx,
        closed,
    };
    (bridge, peer)
}
