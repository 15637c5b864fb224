//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls::accept (https listener only)
//!     → connection.rs (ConnectionInfo attached to requests, drain tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is handled by the `tls` subsystem, not here

pub mod connection;
pub mod listener;

pub use connection::{ConnectionInfo, ConnectionTracker};
pub use listener::{Listener, ListenerError};
