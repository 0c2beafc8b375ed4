//! `kubectl`-backed exec and log transport.
//!
//! Interactive sessions run `kubectl exec -i -t` inside a local PTY so the
//! remote shell sees a real terminal. The credentials and contexts of the
//! configured kubeconfig apply.
//!
//! Until the remote shell prints something of its own, output and
//! keystrokes are held back. An exit in that window is classified from the
//! held output: a runtime "executable file not found" means the shell is
//! missing, a `kubectl` error means the exec could not be established.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use protocol::TerminalSize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::{ExecTarget, ExecTransport, LogOptions, LogSource, LogStream, TransportError};
use crate::config::KubectlConfig;
use crate::session::PtyBridge;

/// Buffer size for reading from the PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Chunks buffered between the blocking PTY threads and the session.
const PTY_CHANNEL_CAPACITY: usize = 64;

/// How long to keep forwarding output after the process has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Exit codes a container runtime reports when the command is missing or
/// not executable.
const COMMAND_NOT_RUNNABLE: [u32; 2] = [126, 127];

/// Quiet time after which held output without errors counts as a prompt.
const PROMPT_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Longest time keystrokes are held back waiting for the shell to speak.
const STARTUP_INPUT_HOLD: Duration = Duration::from_secs(5);

/// Text container runtimes print when the command does not exist.
const COMMAND_MISSING_MARKERS: [&str; 3] = [
    "executable file not found",
    "OCI runtime exec failed",
    "The system cannot find the file specified",
];

/// Line prefixes of messages printed by `kubectl` rather than the container.
const KUBECTL_LINE_PREFIXES: [&str; 4] = [
    "error:",
    "Error from server",
    "Unable to connect to the server",
    EXIT_CODE_PREFIX,
];

/// How `kubectl` reports a non-zero remote exit.
const EXIT_CODE_PREFIX: &str = "command terminated with exit code";

/// Runs remote processes through the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct KubectlTransport {
    binary: String,
    kubeconfig: Option<PathBuf>,
    default_context: Option<String>,
}

impl KubectlTransport {
    /// Creates a transport using `binary` with the ambient kubeconfig.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
            default_context: None,
        }
    }

    /// Creates a transport from the `[kubectl]` config section.
    pub fn from_config(config: &KubectlConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            kubeconfig: config.kubeconfig.clone(),
            default_context: config.default_context.clone(),
        }
    }

    /// Arguments selecting the kubeconfig and context for `target`.
    fn global_args(&self, target: &ExecTarget) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(context) = target.cluster.as_ref().or(self.default_context.as_ref()) {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args
    }

    /// Arguments for an interactive exec of `command` in `target`.
    pub fn exec_args(&self, target: &ExecTarget, command: &[String]) -> Vec<String> {
        let mut args = self.global_args(target);
        args.extend(
            [
                "exec",
                "-i",
                "-t",
                "-n",
                target.namespace.as_str(),
                target.pod.as_str(),
                "-c",
                target.container.as_str(),
                "--",
            ]
            .map(String::from),
        );
        args.extend(command.iter().cloned());
        args
    }

    /// Arguments for streaming the logs of `target`.
    pub fn log_args(&self, target: &ExecTarget, options: &LogOptions) -> Vec<String> {
        let mut args = self.global_args(target);
        args.extend(
            [
                "logs",
                "-n",
                target.namespace.as_str(),
                target.pod.as_str(),
                "-c",
                target.container.as_str(),
            ]
            .map(String::from),
        );
        if options.follow {
            args.push("--follow".to_string());
        }
        if let Some(lines) = options.tail_lines {
            args.push(format!("--tail={lines}"));
        }
        if options.previous {
            args.push("--previous".to_string());
        }
        args
    }
}

/// How the forwarding loop ended.
enum LoopExit {
    Exited(std::io::Result<portable_pty::ExitStatus>),
    Disconnected,
}

/// Kills the local `kubectl` process when dropped.
struct KillOnDrop(Box<dyn ChildKiller + Send + Sync>);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        // Fails once the process has already exited.
        let _ = self.0.kill();
    }
}

/// Where a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineSource {
    /// The container runtime could not start the command.
    Runtime,
    /// `kubectl` itself failed or reported the remote exit code.
    Kubectl,
    /// Anything else, taken to be the remote shell.
    Shell,
}

fn line_source(line: &str) -> LineSource {
    let line = line.trim();
    if COMMAND_MISSING_MARKERS.iter().any(|marker| line.contains(marker)) {
        LineSource::Runtime
    } else if KUBECTL_LINE_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        LineSource::Kubectl
    } else {
        LineSource::Shell
    }
}

/// Output and keystrokes held back until the remote shell shows signs of
/// life.
///
/// Until then nothing is forwarded: output that turns out to be a runtime
/// or `kubectl` error is reported as a [`TransportError`] instead of
/// reaching the client, and keystrokes cannot be mistaken for shell output
/// through the local PTY echo.
#[derive(Debug, Default)]
struct Startup {
    output: Vec<u8>,
    input: Vec<Vec<u8>>,
    live: bool,
}

impl Startup {
    fn is_live(&self) -> bool {
        self.live
    }

    /// Holds a chunk of output. Returns true when a complete line from the
    /// shell makes the session live.
    fn push_output(&mut self, bytes: &[u8]) -> bool {
        self.output.extend_from_slice(bytes);
        if self.live {
            return false;
        }

        let text = String::from_utf8_lossy(&self.output);
        let complete = match text.rfind('\n') {
            Some(end) => &text[..end],
            None => return false,
        };
        self.live = complete
            .lines()
            .filter(|line| !line.trim().is_empty())
            .any(|line| line_source(line) == LineSource::Shell);
        self.live
    }

    /// Called once output has been quiet for a while without the process
    /// exiting. A prompt without a newline makes the session live, unless
    /// the held output contains an error.
    fn settle(&mut self) -> bool {
        if self.live || self.output.is_empty() {
            return false;
        }
        let text = String::from_utf8_lossy(&self.output);
        self.live = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .all(|line| line_source(line) == LineSource::Shell);
        self.live
    }

    fn hold_input(&mut self, bytes: Vec<u8>) {
        self.input.push(bytes);
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    fn take_input(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.input)
    }

    /// Maps an exit before the shell came up to an error.
    ///
    /// Returns `None` after the shell has spoken: from then on every exit
    /// code belongs to the shell.
    fn exit_error(&self, shell: &str, code: u32) -> Option<TransportError> {
        if self.live {
            return None;
        }

        let text = String::from_utf8_lossy(&self.output);
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let sources: Vec<LineSource> = lines.iter().map(|line| line_source(line)).collect();

        if sources.contains(&LineSource::Runtime) {
            return Some(TransportError::ShellUnavailable {
                shell: shell.to_string(),
            });
        }
        if code == 0 {
            return None;
        }

        let kubectl_error = lines
            .iter()
            .zip(&sources)
            .find(|(line, source)| {
                **source == LineSource::Kubectl && !line.starts_with(EXIT_CODE_PREFIX)
            })
            .map(|(line, _)| *line);

        match kubectl_error {
            Some(reason) => Some(TransportError::Establish(reason.to_string())),
            None if COMMAND_NOT_RUNNABLE.contains(&code) => Some(TransportError::ShellUnavailable {
                shell: shell.to_string(),
            }),
            None => Some(TransportError::Establish(
                lines
                    .iter()
                    .find(|line| !line.starts_with(EXIT_CODE_PREFIX))
                    .map(|line| line.to_string())
                    .unwrap_or_else(|| format!("kubectl exited with code {code}")),
            )),
        }
    }
}

/// Forwards keystrokes to the PTY input thread.
async fn forward_input(tty: &PtyBridge, input_tx: &mpsc::Sender<Vec<u8>>, bytes: Vec<u8>) {
    if input_tx.send(bytes).await.is_err() {
        tracing::debug!(session_id = %tty.session_id(), "PTY input closed");
    }
}

#[async_trait]
impl ExecTransport for KubectlTransport {
    async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
        tty: &PtyBridge,
    ) -> Result<(), TransportError> {
        let shell = command.first().cloned().unwrap_or_default();
        let establish = |e: anyhow::Error| TransportError::Establish(e.to_string());

        let pair = native_pty_system()
            .openpty(to_pty_size(tty.size()))
            .map_err(establish)?;

        let mut cmd = CommandBuilder::new(&self.binary);
        cmd.args(self.exec_args(target, command));

        let mut child = pair.slave.spawn_command(cmd).map_err(establish)?;
        // The slave end must not outlive the child, or reads never see EOF.
        drop(pair.slave);

        let _killer = KillOnDrop(child.clone_killer());
        let reader = pair.master.try_clone_reader().map_err(establish)?;
        let writer = pair.master.take_writer().map_err(establish)?;
        let master = pair.master;

        tracing::debug!(
            session_id = %tty.session_id(),
            target = %target,
            shell = %shell,
            pid = ?child.process_id(),
            "kubectl exec started"
        );

        let (output_tx, mut output_rx) = mpsc::channel(PTY_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || pump_output(reader, output_tx));

        let (input_tx, input_rx) = mpsc::channel(PTY_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || pump_input(writer, input_rx));

        let (exit_tx, mut exit_rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || {
            let _ = exit_tx.send(child.wait());
        });

        let mut startup = Startup::default();
        let mut output_done = false;
        let mut input_released = false;
        let input_deadline = Instant::now() + STARTUP_INPUT_HOLD;
        let mut settle_at = Instant::now() + PROMPT_SETTLE_DELAY;

        let exit = loop {
            let went_live = tokio::select! {
                biased;
                chunk = output_rx.recv(), if !output_done => match chunk {
                    Some(bytes) if startup.is_live() => {
                        if tty.write(&bytes).await.is_err() {
                            break LoopExit::Disconnected;
                        }
                        false
                    }
                    Some(bytes) => {
                        settle_at = Instant::now() + PROMPT_SETTLE_DELAY;
                        startup.push_output(&bytes)
                    }
                    None => {
                        output_done = true;
                        false
                    }
                },
                status = &mut exit_rx => {
                    break LoopExit::Exited(status.unwrap_or_else(|_| {
                        Err(std::io::Error::other("exit watcher stopped"))
                    }));
                }
                _ = tokio::time::sleep_until(settle_at), if !startup.is_live() && !startup.output.is_empty() => {
                    startup.settle()
                }
                _ = tokio::time::sleep_until(input_deadline), if !input_released => {
                    input_released = true;
                    for bytes in startup.take_input() {
                        forward_input(tty, &input_tx, bytes).await;
                    }
                    false
                }
                input = tty.read() => match input {
                    Some(bytes) if input_released => {
                        forward_input(tty, &input_tx, bytes).await;
                        false
                    }
                    Some(bytes) => {
                        startup.hold_input(bytes);
                        false
                    }
                    None => break LoopExit::Disconnected,
                },
                size = tty.next_resize() => match size {
                    Some(size) => {
                        if let Err(e) = master.resize(to_pty_size(size)) {
                            tracing::warn!(
                                session_id = %tty.session_id(),
                                error = %e,
                                "Failed to resize PTY"
                            );
                        }
                        false
                    }
                    None => break LoopExit::Disconnected,
                },
            };

            if went_live {
                tracing::debug!(session_id = %tty.session_id(), shell = %shell, "Shell is up");
                if tty.write(&startup.take_output()).await.is_err() {
                    break LoopExit::Disconnected;
                }
                input_released = true;
                for bytes in startup.take_input() {
                    forward_input(tty, &input_tx, bytes).await;
                }
            }
        };

        let status = match exit {
            LoopExit::Disconnected => {
                tracing::debug!(session_id = %tty.session_id(), "Client gone, stopping kubectl");
                return Err(TransportError::Disconnected);
            }
            LoopExit::Exited(status) => {
                status.map_err(|e| TransportError::Stream(e.to_string()))?
            }
        };

        if !output_done {
            let drain = async {
                while let Some(bytes) = output_rx.recv().await {
                    let pending = if startup.is_live() {
                        bytes
                    } else if startup.push_output(&bytes) {
                        startup.take_output()
                    } else {
                        continue;
                    };
                    if tty.write(&pending).await.is_err() {
                        break;
                    }
                }
            };
            let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drain).await;
        }

        let code = status.exit_code();
        tracing::debug!(
            session_id = %tty.session_id(),
            shell = %shell,
            exit_code = code,
            "kubectl exec finished"
        );

        if let Some(error) = startup.exit_error(&shell, code) {
            return Err(error);
        }

        // A shell that exited cleanly before saying anything recognisable.
        let held = startup.take_output();
        if !held.is_empty() {
            let _ = tty.write(&held).await;
        }
        let _ = tty.flush().await;
        Ok(())
    }
}

#[async_trait]
impl LogSource for KubectlTransport {
    async fn open(
        &self,
        target: &ExecTarget,
        options: &LogOptions,
    ) -> Result<LogStream, TransportError> {
        let mut child = Command::new(&self.binary)
            .args(self.log_args(target, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Establish(format!("failed to run {}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Establish("kubectl stdout not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let target = target.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(target_container = %target, "kubectl logs: {}", line);
                }
            });
        }

        Ok(Box::new(ChildOutput {
            _child: child,
            stdout,
        }))
    }
}

/// The stdout of a child process that lives as long as the stream.
struct ChildOutput {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for ChildOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdout).poll_read(cx, buf)
    }
}

fn to_pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Copies PTY output into `tx` until EOF or the receiver goes away.
fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buffer[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side is closed.
            Err(e) => {
                tracing::trace!(error = %e, "PTY read ended");
                break;
            }
        }
    }
}

/// Copies keystrokes from `rx` into the PTY.
fn pump_input(mut writer: Box<dyn Write + Send>, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(data) = rx.blocking_recv() {
        if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
            tracing::trace!(error = %e, "PTY write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(cluster: Option<&str>) -> ExecTarget {
        ExecTarget::new(cluster.map(String::from), "team-a", "web-0", "app").unwrap()
    }

    #[test]
    fn test_exec_args_minimal() {
        let transport = KubectlTransport::new("kubectl");
        let args = transport.exec_args(&target(None), &["bash".to_string()]);
        assert_eq!(
            args,
            vec!["exec", "-i", "-t", "-n", "team-a", "web-0", "-c", "app", "--", "bash"]
        );
    }

    #[test]
    fn test_exec_args_with_kubeconfig_and_cluster() {
        let config = KubectlConfig {
            binary: "/usr/local/bin/kubectl".to_string(),
            kubeconfig: Some(PathBuf::from("/etc/podterm/kubeconfig")),
            default_context: Some("staging".to_string()),
        };
        let transport = KubectlTransport::from_config(&config);

        let args = transport.exec_args(&target(Some("prod")), &["sh".to_string()]);
        assert_eq!(
            &args[..4],
            &["--kubeconfig", "/etc/podterm/kubeconfig", "--context", "prod"]
        );
        assert_eq!(args.last().map(String::as_str), Some("sh"));
    }

    #[test]
    fn test_default_context_used_without_cluster() {
        let config = KubectlConfig {
            default_context: Some("staging".to_string()),
            ..KubectlConfig::default()
        };
        let transport = KubectlTransport::from_config(&config);

        let args = transport.exec_args(&target(None), &["sh".to_string()]);
        assert_eq!(&args[..2], &["--context", "staging"]);
    }

    #[test]
    fn test_log_args() {
        let transport = KubectlTransport::new("kubectl");
        let options = LogOptions {
            follow: true,
            tail_lines: Some(100),
            previous: false,
        };

        let args = transport.log_args(&target(None), &options);
        assert_eq!(
            args,
            vec!["logs", "-n", "team-a", "web-0", "-c", "app", "--follow", "--tail=100"]
        );
    }

    #[tokio::test]
    async fn test_log_source_missing_binary() {
        let transport = KubectlTransport::new("/nonexistent/podterm-kubectl");
        let result = transport.open(&target(None), &LogOptions::default()).await;
        assert!(matches!(result, Err(TransportError::Establish(_))));
    }

    fn startup_with(output: &str) -> Startup {
        let mut startup = Startup::default();
        startup.push_output(output.as_bytes());
        startup
    }

    #[test]
    fn test_runtime_error_means_shell_unavailable() {
        let startup = startup_with(
            "error: Internal error occurred: error executing command in container: \
             failed to exec in container: exec: \"bash\": executable file not found in $PATH\r\n",
        );

        assert!(!startup.is_live());
        assert!(matches!(
            startup.exit_error("bash", 1),
            Some(TransportError::ShellUnavailable { shell }) if shell == "bash"
        ));
    }

    #[test]
    fn test_kubectl_errors_are_establish_failures() {
        for output in [
            "error: open /etc/podterm/kubeconfig: no such file or directory\n",
            "Unable to connect to the server: dial tcp 10.0.0.1:443: i/o timeout\n",
            "Error from server (Forbidden): pods \"web-0\" is forbidden\n",
        ] {
            let startup = startup_with(output);
            match startup.exit_error("bash", 1) {
                Some(TransportError::Establish(reason)) => assert_eq!(reason, output.trim()),
                other => panic!("unexpected classification for {output:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_silent_exit_before_shell() {
        let startup = Startup::default();

        assert!(matches!(
            startup.exit_error("cmd", 127),
            Some(TransportError::ShellUnavailable { .. })
        ));
        assert!(matches!(
            startup.exit_error("cmd", 1),
            Some(TransportError::Establish(reason)) if reason == "kubectl exited with code 1"
        ));
        assert!(startup.exit_error("cmd", 0).is_none());
    }

    #[test]
    fn test_shell_line_makes_session_live() {
        let mut startup = Startup::default();

        assert!(!startup.push_output(b"command terminated with exit code 126\n"));
        assert!(!startup.push_output(b"root@web-0:/#"));
        assert!(startup.push_output(b" ls\n"));
        assert!(startup.is_live());

        // Once the shell has spoken, its exit code is its own.
        assert!(startup.exit_error("bash", 127).is_none());
    }

    #[test]
    fn test_settle_accepts_quiet_prompt_only() {
        let mut prompt = startup_with("$ ");
        assert!(prompt.settle());

        let mut failing = startup_with("OCI runtime exec failed: exec failed");
        assert!(!failing.settle());

        assert!(!Startup::default().settle());
    }

    /// Exec tests against a shell script standing in for `kubectl`.
    #[cfg(unix)]
    mod scripted {
        use std::sync::Arc;

        use protocol::TerminalOp;
        use serial_test::serial;
        use tempfile::TempDir;

        use super::*;
        use crate::exec::testing::{test_bridge, TestPeer};
        use crate::exec::{ProcessAttacher, Shell};

        /// `bash` is missing; any other shell reports its size and echoes
        /// one line.
        const MISSING_BASH: &str = r#"
case "$shell" in
  bash)
    sleep 0.3
    echo 'OCI runtime exec failed: exec failed: unable to start container process: exec: "bash": executable file not found in $PATH: unknown'
    echo 'command terminated with exit code 126'
    exit 126
    ;;
esac
echo "size $(stty size)"
echo ready
read line
echo "got $line"
"#;

        /// Writes an executable `kubectl` stand-in running `body`.
        ///
        /// `$shell` holds the exec'd command, and every attempt is appended
        /// to `attempts` next to the script.
        fn fake_kubectl(body: &str) -> (TempDir, KubectlTransport) {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("kubectl");
            let script = format!(
                "#!/bin/sh\nfor arg in \"$@\"; do shell=\"$arg\"; done\necho \"$shell\" >> \"{}\"\n{body}\n",
                dir.path().join("attempts").display()
            );
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

            let transport = KubectlTransport::new(path.display().to_string());
            (dir, transport)
        }

        fn attempts(dir: &TempDir) -> Vec<String> {
            std::fs::read_to_string(dir.path().join("attempts"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }

        async fn read_until(peer: &mut TestPeer, needle: &str) -> String {
            let mut text = String::new();
            while !text.contains(needle) {
                match tokio::time::timeout(Duration::from_secs(10), peer.outbound.recv()).await {
                    Ok(Some(message)) if message.op == TerminalOp::Stdout => {
                        text.push_str(message.data.as_deref().unwrap_or_default());
                    }
                    Ok(Some(_)) => {}
                    _ => panic!("{needle:?} never arrived, got {text:?}"),
                }
            }
            text
        }

        #[tokio::test]
        #[serial]
        async fn test_missing_shell_falls_back_despite_early_input() {
            let (dir, transport) = fake_kubectl(MISSING_BASH);
            let attacher = ProcessAttacher::new(Arc::new(transport));
            let (bridge, mut peer) = test_bridge();
            peer.resizes.send(TerminalSize::new(40, 120)).await.unwrap();
            peer.stdin("echo hi\n").await;

            let client = async {
                let mut output = read_until(&mut peer, "ready").await;
                peer.stdin("exit\n").await;
                output.push_str(&read_until(&mut peer, "got exit").await);
                output
            };
            let pod = target(None);
            let (result, output) = tokio::join!(attacher.attach(&pod, None, &bridge), client);

            assert_eq!(result.unwrap(), Shell::Sh);
            assert_eq!(attempts(&dir), vec!["bash", "sh"]);
            // The fallback shell starts at the size the client asked for.
            assert!(output.contains("size 40 120"), "{output:?}");
            // The failed attempt's runtime error never reaches the client.
            assert!(!output.contains("executable file not found"), "{output:?}");
        }

        #[tokio::test]
        #[serial]
        async fn test_kubectl_failure_is_reported_not_retried() {
            let (dir, transport) = fake_kubectl(
                r#"echo 'Error from server (NotFound): pods "web-0" not found' >&2; exit 1"#,
            );
            let attacher = ProcessAttacher::new(Arc::new(transport));
            let (bridge, mut peer) = test_bridge();

            let result = attacher.attach(&target(None), None, &bridge).await;

            match result {
                Err(TransportError::Establish(reason)) => {
                    assert!(reason.contains("NotFound"), "{reason}");
                }
                other => panic!("unexpected result: {other:?}"),
            }
            assert_eq!(attempts(&dir), vec!["bash"]);
            assert!(peer.outbound.try_recv().is_err());
        }

        #[tokio::test]
        #[serial]
        async fn test_exit_code_after_prompt_belongs_to_shell() {
            let (_dir, transport) = fake_kubectl("echo 'sh-5.2$ '; sleep 0.2; exit 127");
            let (bridge, mut peer) = test_bridge();

            let result = transport
                .exec(&target(None), &["sh".to_string()], &bridge)
                .await;

            assert!(result.is_ok(), "{result:?}");
            read_until(&mut peer, "sh-5.2$").await;
        }

        #[tokio::test]
        #[serial]
        async fn test_prompt_releases_held_input() {
            let (_dir, transport) = fake_kubectl(r#"printf '$ '; read line; echo "got $line""#);
            let (bridge, mut peer) = test_bridge();
            peer.stdin("pwd\n").await;

            let result = transport
                .exec(&target(None), &["sh".to_string()], &bridge)
                .await;

            assert!(result.is_ok(), "{result:?}");
            let output = read_until(&mut peer, "got pwd").await;
            assert!(output.starts_with("$ "), "{output:?}");
        }

        #[cfg(target_os = "linux")]
        #[tokio::test]
        #[serial]
        async fn test_disconnect_kills_kubectl() {
            let (dir, transport) =
                fake_kubectl(r#"echo $$ > "$(dirname "$0")/pid"; echo ready; exec sleep 30"#);
            let (bridge, mut peer) = test_bridge();

            let client = async {
                read_until(&mut peer, "ready").await;
                peer.closed.cancel();
            };
            let pod = target(None);
            let command = ["sh".to_string()];
            let exec = tokio::time::timeout(
                Duration::from_secs(10),
                transport.exec(&pod, &command, &bridge),
            );
            let (result, ()) = tokio::join!(exec, client);

            assert!(matches!(result, Ok(Err(TransportError::Disconnected))));

            let pid = std::fs::read_to_string(dir.path().join("pid")).unwrap();
            let proc_dir = PathBuf::from(format!("/proc/{}", pid.trim()));
            for _ in 0..100 {
                if !proc_dir.exists() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("kubectl stand-in {} still running", pid.trim());
        }
    }
}
