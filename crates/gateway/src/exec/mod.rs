//! Remote process execution.
//!
//! The gateway never talks to the cluster API directly. It hands a target
//! container, a command and a [`PtyBridge`] to an [`ExecTransport`], which
//! runs the interactive process and pumps bytes until the process exits or
//! the bridge reports end-of-stream. Log streaming goes through the
//! one-directional [`LogSource`].

pub mod attacher;
pub mod kubectl;
pub mod shell;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::session::PtyBridge;

pub use attacher::ProcessAttacher;
pub use kubectl::KubectlTransport;
pub use shell::Shell;

/// The container a terminal or log stream targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecTarget {
    /// Cluster context; the transport's default applies when `None`.
    pub cluster: Option<String>,
    /// Namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub pod: String,
    /// Container name within the pod.
    pub container: String,
}

/// A target with a blank path segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} must not be empty")]
pub struct InvalidTarget(pub &'static str);

impl ExecTarget {
    /// Builds a target, rejecting blank segments.
    ///
    /// A blank cluster is treated as "use the default".
    pub fn new(
        cluster: Option<String>,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Result<Self, InvalidTarget> {
        let namespace = namespace.into();
        let pod = pod.into();
        let container = container.into();

        for (name, value) in [
            ("namespace", &namespace),
            ("pod", &pod),
            ("container", &container),
        ] {
            if value.trim().is_empty() {
                return Err(InvalidTarget(name));
            }
        }

        Ok(Self {
            cluster: cluster.filter(|c| !c.trim().is_empty()),
            namespace,
            pod,
            container,
        })
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.cluster.as_deref().unwrap_or("default"),
            self.namespace,
            self.pod,
            self.container
        )
    }
}

/// Errors raised while establishing or running a remote process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The requested shell does not exist in the container.
    #[error("shell '{shell}' is not available in the container")]
    ShellUnavailable { shell: String },

    /// None of the allowed shells could be started.
    #[error("no supported shell could be started (tried {tried})")]
    NoShellAvailable { tried: String },

    /// The exec channel could not be opened.
    #[error("failed to establish exec stream: {0}")]
    Establish(String),

    /// The exec channel broke after it was established.
    #[error("exec stream failed: {0}")]
    Stream(String),

    /// The client went away; the process was torn down.
    #[error("client disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether the error only means "try the next shell".
    pub fn is_shell_unavailable(&self) -> bool {
        matches!(self, TransportError::ShellUnavailable { .. })
    }
}

/// Runs an interactive process inside a container.
#[async_trait]
pub trait ExecTransport: Send + Sync {
    /// Executes `command` in `target` with its terminal wired to `tty`.
    ///
    /// Returns once the remote process has exited. Implementations must
    /// return [`TransportError::ShellUnavailable`] when the command itself
    /// cannot be started, so the caller can fall back to another shell.
    async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
        tty: &PtyBridge,
    ) -> Result<(), TransportError>;
}

/// Options for a log stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep streaming new lines.
    pub follow: bool,
    /// Only return this many trailing lines.
    pub tail_lines: Option<u64>,
    /// Read logs of the previous container instance.
    pub previous: bool,
}

/// A byte stream of container logs.
pub type LogStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opens container log streams.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Opens the log stream of `target`.
    async fn open(
        &self,
        target: &ExecTarget,
        options: &LogOptions,
    ) -> Result<LogStream, TransportError>;
}
