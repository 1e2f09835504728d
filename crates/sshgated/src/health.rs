//! Structured health reporting for gateway lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use sshgate_config::Config;

use crate::bootstrap::BootstrapError;
use crate::circuit::CircuitState;
use crate::session::SessionError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener accepts connections.
    fn listener_started(&self, addr: SocketAddr);

    /// Invoked after the listener closed its socket.
    fn listener_stopped(&self, addr: SocketAddr);

    /// Invoked when a connection is dropped because the circuit is open.
    fn connection_refused(&self, peer: SocketAddr);

    /// Invoked when a connection fails before the client authenticated.
    fn handshake_failed(&self, peer: SocketAddr, error: &SessionError);

    /// Invoked when an authenticated SSH session ends with an error.
    fn session_failed(&self, peer: SocketAddr, error: &SessionError);

    /// Invoked after an administrative circuit transition.
    fn circuit_changed(&self, previous: CircuitState, current: CircuitState);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_started(&self, addr: SocketAddr) {
        (**self).listener_started(addr);
    }

    fn listener_stopped(&self, addr: SocketAddr) {
        (**self).listener_stopped(addr);
    }

    fn connection_refused(&self, peer: SocketAddr) {
        (**self).connection_refused(peer);
    }

    fn handshake_failed(&self, peer: SocketAddr, error: &SessionError) {
        (**self).handshake_failed(peer, error);
    }

    fn session_failed(&self, peer: SocketAddr, error: &SessionError) {
        (**self).session_failed(peer, error);
    }

    fn circuit_changed(&self, previous: CircuitState, current: CircuitState) {
        (**self).circuit_changed(previous, current);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting gateway bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen_address = %config.listen_address(),
            authorized_keys = config.authorized_keys_path().map(camino::Utf8Path::as_str),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "gateway bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "gateway bootstrap failed"
        );
    }

    fn listener_started(&self, addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            %addr,
            "accepting ssh connections"
        );
    }

    fn listener_stopped(&self, addr: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_stopped",
            %addr,
            "listener closed"
        );
    }

    fn connection_refused(&self, peer: SocketAddr) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "connection_refused",
            %peer,
            "circuit open, connection refused"
        );
    }

    fn handshake_failed(&self, peer: SocketAddr, error: &SessionError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "handshake_failed",
            %peer,
            error = %error,
            "ssh handshake failed"
        );
    }

    fn session_failed(&self, peer: SocketAddr, error: &SessionError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "session_failed",
            %peer,
            error = %error,
            "ssh session ended with an error"
        );
    }

    fn circuit_changed(&self, previous: CircuitState, current: CircuitState) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "circuit_changed",
            %previous,
            %current,
            "circuit state changed"
        );
    }
}
