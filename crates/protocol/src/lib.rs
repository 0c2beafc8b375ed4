//! # podterm Protocol Library
//!
//! Wire definitions shared by the podterm gateway and its clients.
//!
//! ## Overview
//!
//! - **Terminal envelope**: the JSON [`TerminalMessage`] exchanged on the terminal socket
//! - **Client commands**: validated, direction-checked inbound frames ([`ClientCommand`])
//! - **UTF-8 framing**: turning arbitrary output chunks into complete text ([`Utf8Framer`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │      TerminalMessage (JSON text)        │  bind / stdin / resize / stdout / toast
//! ├─────────────────────────────────────────┤
//! │          WebSocket text frames          │
//! ├─────────────────────────────────────────┤
//! │              HTTP upgrade               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ClientCommand, TerminalMessage, TerminalSize};
//!
//! let frame = TerminalMessage::resize(TerminalSize::new(40, 120)).to_json().unwrap();
//! let command = ClientCommand::parse(&frame).unwrap();
//! assert_eq!(command, ClientCommand::Resize(TerminalSize::new(40, 120)));
//! ```

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{find_utf8_boundary, Utf8Framer};
pub use messages::{ClientCommand, Direction, TerminalMessage, TerminalOp, TerminalSize};
