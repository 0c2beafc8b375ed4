//! Per-session bind waiter.
//!
//! Every started terminal gets one waiter task. It waits for a client to
//! bind, runs the shell for as long as it lives, and removes the session
//! from the registry on every exit path.

use std::sync::Arc;
use std::time::Duration;

use protocol::TerminalSize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::bridge::PtyBridge;
use super::registry::SessionRegistry;
use super::state::{Connection, Session};
use crate::exec::{ProcessAttacher, TransportError};

/// How a waiter task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterOutcome {
    /// The shell ran and exited, or the client went away.
    Finished,
    /// The shell could not be started or the exec stream broke.
    Failed,
    /// No client bound before the timeout.
    TimedOut,
    /// The gateway is shutting down.
    Shutdown,
    /// The session was dropped before anyone bound it.
    Abandoned,
}

/// Everything a waiter needs, moved into its task.
pub(crate) struct BindWaiter {
    pub session: Arc<Session>,
    pub registry: SessionRegistry,
    pub attacher: Arc<ProcessAttacher>,
    pub bind_rx: oneshot::Receiver<Connection>,
    pub resize_rx: mpsc::Receiver<TerminalSize>,
    pub timeout: Duration,
    pub shutdown: CancellationToken,
}

impl BindWaiter {
    pub(crate) async fn run(self) -> WaiterOutcome {
        let BindWaiter {
            session,
            registry,
            attacher,
            bind_rx,
            resize_rx,
            timeout,
            shutdown,
        } = self;
        let id = session.id().clone();

        let connection = tokio::select! {
            biased;
            bound = bind_rx => match bound {
                Ok(connection) => connection,
                Err(_) => {
                    registry.close(&id);
                    return WaiterOutcome::Abandoned;
                }
            },
            _ = shutdown.cancelled() => {
                registry.close(&id);
                return WaiterOutcome::Shutdown;
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::info!(
                    session_id = %id,
                    timeout_secs = timeout.as_secs(),
                    "No client bound in time, discarding session"
                );
                registry.close(&id);
                return WaiterOutcome::TimedOut;
            }
        };

        let target = session.target().clone();
        tracing::info!(
            session_id = %id,
            conn_id = %connection.conn_id,
            cluster = target.cluster.as_deref().unwrap_or("default"),
            namespace = %target.namespace,
            pod = %target.pod,
            container = %target.container,
            "Client bound, starting shell"
        );

        session.mark_running();
        let bridge = PtyBridge::new(id.clone(), connection, resize_rx);

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            result = attacher.attach(&target, session.shell_hint(), &bridge) => Some(result),
        };

        let outcome = match result {
            None => {
                let _ = bridge.toast("Gateway is shutting down").await;
                WaiterOutcome::Shutdown
            }
            Some(Ok(shell)) => {
                tracing::info!(session_id = %id, shell = %shell, "Shell exited");
                WaiterOutcome::Finished
            }
            Some(Err(TransportError::Disconnected)) => {
                tracing::info!(session_id = %id, "Client disconnected");
                WaiterOutcome::Finished
            }
            Some(Err(e)) => {
                tracing::error!(
                    session_id = %id,
                    cluster = target.cluster.as_deref().unwrap_or("default"),
                    namespace = %target.namespace,
                    pod = %target.pod,
                    container = %target.container,
                    error = %e,
                    "Terminal session failed"
                );
                let _ = bridge.toast(e.to_string()).await;
                WaiterOutcome::Failed
            }
        };

        registry.close(&id);
        // Dropping the bridge releases the outbound channel, which closes the socket.
        drop(bridge);
        outcome
    }
}
