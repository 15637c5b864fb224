//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (http listener) / TLS stream (https listener)
//!     → server.rs (hyper-util auto: HTTP/1.1 or HTTP/2)
//!     → ConnectionInfo extension (peer address, TLS session)
//!     → TraceLayer → body limit → optional timeout
//!     → Gateway::dispatch (endpoint, pipeline, response)
//!     → Send to client
//! ```

pub mod server;

pub use server::{BoundListeners, HttpServer};
