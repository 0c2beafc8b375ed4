//! Error types for the protocol crate.

use thiserror::Error;

use crate::messages::TerminalOp;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to serialize a message.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a message.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A server-bound frame carried an op that only the server may send.
    #[error("op '{0}' is not accepted from clients")]
    WrongDirection(TerminalOp),

    /// A frame is missing a field its op requires.
    #[error("op '{op}' requires field '{field}'")]
    MissingField {
        /// The op of the offending frame.
        op: TerminalOp,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A resize frame carried a zero dimension.
    #[error("invalid terminal size {rows}x{cols}")]
    InvalidSize {
        /// Requested rows.
        rows: u16,
        /// Requested columns.
        cols: u16,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}
