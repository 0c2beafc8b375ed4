//! Terminal session management.
//!
//! A start request creates a pending [`Session`] in the [`SessionRegistry`]
//! and spawns one waiter task for it. When a client binds over the terminal
//! socket, the waiter wires the connection to a remote shell through a
//! [`PtyBridge`] and removes the session once the shell is gone.

pub mod bridge;
pub mod factory;
pub mod registry;
pub mod state;
pub mod waiter;

pub use bridge::PtyBridge;
pub use factory::{generate_session_id, SessionFactory, SessionSettings, StartedTerminal};
pub use registry::SessionRegistry;
pub use state::{Connection, Session, SessionError, SessionId, SessionState};
pub use waiter::WaiterOutcome;
