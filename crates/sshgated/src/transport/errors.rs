//! Error types for listener operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors that end a serve call. Per-connection failures never appear here.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listen host could not be resolved.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// The listen host resolved to no address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
    },
    /// Binding the socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The bound socket could not report its address.
    #[error("failed to read listener address: {source}")]
    LocalAddr {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the socket to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Registering the socket with the async runtime failed.
    #[error("failed to register listener with the runtime: {source}")]
    Register {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Closing the socket on shutdown failed.
    #[error("failed to close listener at {addr}: {source}")]
    Close {
        /// Address of the listener being closed.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
