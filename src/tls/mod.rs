//! TLS termination subsystem.
//!
//! # Data Flow
//! ```text
//! TCP stream (https listener)
//!     → acceptor.rs (read ClientHello, no certificate chosen yet)
//!     → sni.rs (exact SNI hostname → HostBinding)
//!         no binding → connection dropped, handshake never completes
//!     → per-host rustls ServerConfig (cert, key, client CA, options)
//!     → TlsStream + TlsSession { sni, authorized }
//!     → HTTP layer
//! ```
//!
//! # Design Decisions
//! - One `ServerConfig` per host, built at config compile time
//! - Host options override the global options field by field
//! - Client certificates are verified once more after the handshake so
//!   `authorized` is reported even when unverified peers are allowed in

pub mod acceptor;
pub mod sni;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use acceptor::accept;
pub use sni::{HostBinding, SniResolver, TlsOptions};

/// What the HTTP layer learns about a TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSession {
    /// Server name the client asked for.
    pub sni: String,
    /// Whether the client presented a certificate issued by a trusted CA.
    pub authorized: bool,
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("tls host `{host}`: {source}")]
    Rustls {
        host: String,
        #[source]
        source: rustls::Error,
    },

    #[error("tls host `{host}`: invalid client CA bundle: {source}")]
    ClientCa {
        host: String,
        #[source]
        source: rustls::server::VerifierBuilderError,
    },

    #[error("client hello carried no server name")]
    MissingSni,

    #[error("no certificate configured for {0}")]
    NoCertificate(String),

    #[error("tls handshake failed: {0}")]
    Handshake(#[source] io::Error),
}
