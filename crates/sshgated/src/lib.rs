//! SSH remote-command gateway.
//!
//! Clients open authenticated SSH sessions and send one `exec` command line
//! per session channel. The gateway resolves the first token of the line to
//! a registered [`dispatch::Route`], runs its step pipeline against a
//! request-scoped [`dispatch::RequestContext`], and answers with the output,
//! an exit status, EOF and a channel close.
//!
//! A [`Circuit`] gates new connections. While it is open, accepted sockets
//! are dropped before any SSH byte is exchanged; connections already admitted
//! are untouched. The running daemon trips the circuit on `SIGUSR1`, resets
//! it on `SIGUSR2`, and drains on `SIGTERM`, `SIGINT`, `SIGQUIT` or `SIGHUP`.
//!
//! Embedders that want their own routes build a
//! [`dispatch::CommandRegistry`], bind a [`GatewayListener`] and call
//! [`Gateway::serve`] with a [`ShutdownHandle`] they control.

mod bootstrap;
pub mod circuit;
pub mod dispatch;
mod health;
mod host_key;
mod process;
pub mod session;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use circuit::{Circuit, CircuitState};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use host_key::{HostKeyError, load_host_key};
pub use process::{LaunchError, ShutdownError, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{Gateway, GatewayListener, ListenerError, ShutdownHandle};

#[cfg(test)]
mod tests;
