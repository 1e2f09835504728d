//! TCP listener and accept loop.
//!
//! [`GatewayListener`] binds the configured address. [`Gateway::serve`]
//! accepts on it until its [`ShutdownHandle`] fires, gating every connection
//! on the circuit before the SSH handshake begins.

mod errors;
mod gateway;
mod listener;
mod shutdown;

pub use self::errors::ListenerError;
pub use self::gateway::Gateway;
pub use self::listener::GatewayListener;
pub use self::shutdown::ShutdownHandle;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
