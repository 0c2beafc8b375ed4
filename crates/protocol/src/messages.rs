//! Terminal wire envelope.
//!
//! Every WebSocket text frame on the terminal socket carries exactly one
//! [`TerminalMessage`] encoded as JSON:
//!
//! ```json
//! {"op": "bind", "sessionId": "4f1c..."}
//! {"op": "stdin", "data": "ls -la\n"}
//! {"op": "resize", "rows": 40, "cols": 120}
//! {"op": "stdout", "data": "total 8\r\n"}
//! {"op": "toast", "data": "remote shell exited"}
//! ```
//!
//! The direction of each op is fixed. Inbound frames are narrowed into a
//! [`ClientCommand`] before the gateway acts on them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Operation carried by a terminal frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalOp {
    /// Associate the socket with a pending session (client to server).
    Bind,
    /// Keystrokes for the remote process (client to server).
    Stdin,
    /// Terminal dimensions changed (client to server).
    Resize,
    /// Output of the remote process (server to client).
    Stdout,
    /// Out-of-band notice rendered inline by the client (server to client).
    Toast,
}

/// Which side of the socket may send an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by the browser/client.
    ClientToServer,
    /// Sent by the gateway.
    ServerToClient,
}

impl TerminalOp {
    /// Returns the wire name of the op.
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalOp::Bind => "bind",
            TerminalOp::Stdin => "stdin",
            TerminalOp::Resize => "resize",
            TerminalOp::Stdout => "stdout",
            TerminalOp::Toast => "toast",
        }
    }

    /// Returns the fixed direction of the op.
    pub fn direction(self) -> Direction {
        match self {
            TerminalOp::Bind | TerminalOp::Stdin | TerminalOp::Resize => Direction::ClientToServer,
            TerminalOp::Stdout | TerminalOp::Toast => Direction::ServerToClient,
        }
    }
}

impl fmt::Display for TerminalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows.
    pub rows: u16,
    /// Number of columns.
    pub cols: u16,
}

impl TerminalSize {
    /// Creates a new size.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// The JSON envelope exchanged on the terminal socket.
///
/// Fields other than `op` are optional on the wire and only meaningful for
/// the ops that use them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalMessage {
    /// The operation.
    pub op: TerminalOp,
    /// Payload for `stdin`, `stdout` and `toast`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Session token for `bind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Rows for `resize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
    /// Columns for `resize`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
}

impl TerminalMessage {
    fn empty(op: TerminalOp) -> Self {
        Self {
            op,
            data: None,
            session_id: None,
            rows: None,
            cols: None,
        }
    }

    /// A `bind` frame for the given session token.
    pub fn bind(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::empty(TerminalOp::Bind)
        }
    }

    /// A `stdin` frame.
    pub fn stdin(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::empty(TerminalOp::Stdin)
        }
    }

    /// A `resize` frame.
    pub fn resize(size: TerminalSize) -> Self {
        Self {
            rows: Some(size.rows),
            cols: Some(size.cols),
            ..Self::empty(TerminalOp::Resize)
        }
    }

    /// A `stdout` frame.
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::empty(TerminalOp::Stdout)
        }
    }

    /// A `toast` frame.
    pub fn toast(message: impl Into<String>) -> Self {
        Self {
            data: Some(message.into()),
            ..Self::empty(TerminalOp::Toast)
        }
    }

    /// Serializes the message to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a message from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A validated client-to-server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Attach this socket to the session with the given token.
    Bind {
        /// Session token returned by the start-terminal call.
        session_id: String,
    },
    /// Input for the remote process.
    Stdin(String),
    /// New terminal dimensions.
    Resize(TerminalSize),
}

impl ClientCommand {
    /// Parses and validates a client frame in one step.
    pub fn parse(text: &str) -> Result<Self> {
        TerminalMessage::from_json(text)?.try_into()
    }
}

impl TryFrom<TerminalMessage> for ClientCommand {
    type Error = ProtocolError;

    fn try_from(msg: TerminalMessage) -> Result<Self> {
        if msg.op.direction() != Direction::ClientToServer {
            return Err(ProtocolError::WrongDirection(msg.op));
        }

        match msg.op {
            TerminalOp::Bind => {
                let session_id = msg.session_id.ok_or(ProtocolError::MissingField {
                    op: msg.op,
                    field: "sessionId",
                })?;
                Ok(ClientCommand::Bind { session_id })
            }
            // An empty keystroke frame is legal and simply forwards nothing.
            TerminalOp::Stdin => Ok(ClientCommand::Stdin(msg.data.unwrap_or_default())),
            TerminalOp::Resize => {
                let rows = msg.rows.ok_or(ProtocolError::MissingField {
                    op: msg.op,
                    field: "rows",
                })?;
                let cols = msg.cols.ok_or(ProtocolError::MissingField {
                    op: msg.op,
                    field: "cols",
                })?;
                if rows == 0 || cols == 0 {
                    return Err(ProtocolError::InvalidSize { rows, cols });
                }
                Ok(ClientCommand::Resize(TerminalSize { rows, cols }))
            }
            TerminalOp::Stdout | TerminalOp::Toast => Err(ProtocolError::WrongDirection(msg.op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_directions() {
        assert_eq!(TerminalOp::Bind.direction(), Direction::ClientToServer);
        assert_eq!(TerminalOp::Stdin.direction(), Direction::ClientToServer);
        assert_eq!(TerminalOp::Resize.direction(), Direction::ClientToServer);
        assert_eq!(TerminalOp::Stdout.direction(), Direction::ServerToClient);
        assert_eq!(TerminalOp::Toast.direction(), Direction::ServerToClient);
    }

    #[test]
    fn test_stdout_omits_unused_fields() {
        let json = TerminalMessage::stdout("hi\r\n").to_json().unwrap();
        assert_eq!(json, r#"{"op":"stdout","data":"hi\r\n"}"#);
    }

    #[test]
    fn test_bind_uses_camel_case_session_id() {
        let json = TerminalMessage::bind("abc").to_json().unwrap();
        assert_eq!(json, r#"{"op":"bind","sessionId":"abc"}"#);
    }

    #[test]
    fn test_parse_bind() {
        let cmd = ClientCommand::parse(r#"{"op":"bind","sessionId":"0123abcd"}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Bind {
                session_id: "0123abcd".to_string()
            }
        );
    }

    #[test]
    fn test_parse_bind_without_session_id() {
        let err = ClientCommand::parse(r#"{"op":"bind"}"#).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                op: TerminalOp::Bind,
                field: "sessionId"
            }
        );
    }

    #[test]
    fn test_parse_stdin_ignores_irrelevant_fields() {
        let cmd = ClientCommand::parse(r#"{"op":"stdin","data":"ls\n","rows":3}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Stdin("ls\n".to_string()));
    }

    #[test]
    fn test_parse_stdin_without_data() {
        let cmd = ClientCommand::parse(r#"{"op":"stdin"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Stdin(String::new()));
    }

    #[test]
    fn test_parse_resize() {
        let cmd = ClientCommand::parse(r#"{"op":"resize","rows":40,"cols":120}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Resize(TerminalSize::new(40, 120)));
    }

    #[test]
    fn test_parse_resize_missing_cols() {
        let err = ClientCommand::parse(r#"{"op":"resize","rows":40}"#).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                op: TerminalOp::Resize,
                field: "cols"
            }
        );
    }

    #[test]
    fn test_parse_resize_zero_dimension() {
        let err = ClientCommand::parse(r#"{"op":"resize","rows":0,"cols":80}"#).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidSize { rows: 0, cols: 80 });
    }

    #[test]
    fn test_server_ops_rejected_from_client() {
        let err = ClientCommand::parse(r#"{"op":"stdout","data":"x"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::WrongDirection(TerminalOp::Stdout));

        let err = ClientCommand::parse(r#"{"op":"toast","data":"x"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::WrongDirection(TerminalOp::Toast));
    }

    #[test]
    fn test_unknown_op_is_deserialization_error() {
        let err = ClientCommand::parse(r#"{"op":"exec","data":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_default_size() {
        assert_eq!(TerminalSize::default(), TerminalSize::new(24, 80));
    }
}
