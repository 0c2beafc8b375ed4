//! Shell selection on top of an [`ExecTransport`].

use std::sync::Arc;

use super::shell::Shell;
use super::{ExecTarget, ExecTransport, TransportError};
use crate::session::PtyBridge;

/// Starts an interactive shell in a container and keeps it wired to a
/// session's terminal until it exits.
pub struct ProcessAttacher {
    transport: Arc<dyn ExecTransport>,
}

impl ProcessAttacher {
    /// Creates an attacher over the given transport.
    pub fn new(transport: Arc<dyn ExecTransport>) -> Self {
        Self { transport }
    }

    /// Runs a shell in `target` until it exits.
    ///
    /// An allowed `shell_hint` is the only shell tried. Otherwise each shell
    /// of the allow-list is tried in order and the first one that starts is
    /// used. Returns the shell that ran.
    pub async fn attach(
        &self,
        target: &ExecTarget,
        shell_hint: Option<&str>,
        tty: &PtyBridge,
    ) -> Result<Shell, TransportError> {
        let candidates = Shell::candidates(shell_hint);

        if let Some(hint) = shell_hint.filter(|hint| hint.parse::<Shell>().is_err()) {
            tracing::debug!(
                session_id = %tty.session_id(),
                hint = %hint,
                "Shell hint not allowed, trying all shells"
            );
        }

        for shell in &candidates {
            tracing::debug!(
                session_id = %tty.session_id(),
                target = %target,
                shell = %shell,
                "Starting shell"
            );

            match self.transport.exec(target, &shell.command(), tty).await {
                Ok(()) => return Ok(*shell),
                Err(e) if e.is_shell_unavailable() && candidates.len() > 1 => {
                    tracing::debug!(
                        session_id = %tty.session_id(),
                        shell = %shell,
                        "Shell not available, trying next"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let tried = candidates
            .iter()
            .map(|shell| shell.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Err(TransportError::NoShellAvailable { tried })
    }
}

impl std::fmt::Debug for ProcessAttacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessAttacher").finish_non_exhaustive()
    }
}
