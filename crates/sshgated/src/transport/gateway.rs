//! Accept loop tying the circuit, the SSH transport and dispatch together.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use russh::server::Config as SshConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::{GatewayListener, LISTENER_TARGET, ListenerError, ShutdownHandle};
use crate::circuit::Circuit;
use crate::dispatch::Router;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::session::{AuthPolicy, SessionHandler};

const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// An SSH command gateway ready to serve a bound listener.
///
/// The gateway owns no global state: the circuit and the shutdown handle are
/// passed in by whoever supervises it, and stay usable from outside while
/// [`Gateway::serve`] runs.
pub struct Gateway {
    router: Arc<Router>,
    circuit: Arc<Circuit>,
    ssh_config: Arc<SshConfig>,
    auth: Arc<AuthPolicy>,
    reporter: Arc<dyn HealthReporter>,
    drain_timeout: Duration,
}

impl Gateway {
    /// Creates a gateway with anonymous authentication, `tracing` health
    /// reporting and a five second drain budget.
    #[must_use]
    pub fn new(router: Arc<Router>, circuit: Arc<Circuit>, ssh_config: Arc<SshConfig>) -> Self {
        Self {
            router,
            circuit,
            ssh_config,
            auth: Arc::new(AuthPolicy::Anonymous),
            reporter: Arc::new(StructuredHealthReporter::new()),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    /// Replaces the authentication policy. It must agree with the methods in
    /// the SSH configuration.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<AuthPolicy>) -> Self {
        self.auth = auth;
        self
    }

    /// Replaces the health reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets how long shutdown waits for live connections.
    #[must_use]
    pub const fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Circuit consulted for every accepted connection.
    #[must_use]
    pub const fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Accepts connections until `shutdown` is triggered.
    ///
    /// Each accepted connection is checked against the circuit first: while
    /// it is open the socket is dropped before any SSH byte is exchanged.
    /// Admitted connections run on their own task. On shutdown the socket is
    /// closed, then live connections get up to the drain timeout to finish;
    /// any still running afterwards are left to end on their own.
    ///
    /// # Errors
    ///
    /// Returns an error when the socket cannot be registered with the
    /// runtime or closed. Connection failures are reported, never returned.
    pub async fn serve(
        &self,
        listener: GatewayListener,
        shutdown: ShutdownHandle,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr();
        let socket = TcpListener::from_std(listener.into_std())
            .map_err(|source| ListenerError::Register { source })?;
        let connections = TaskTracker::new();
        self.reporter.listener_started(addr);

        let mut last_error = None::<io::ErrorKind>;
        loop {
            let accepted = tokio::select! {
                biased;
                () = shutdown.triggered() => break,
                accepted = socket.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    last_error = None;
                    self.admit(&connections, stream, peer);
                }
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: LISTENER_TARGET, error = %error, "socket accept error");
                    }
                    last_error = Some(kind);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        let closed = socket
            .into_std()
            .map_err(|source| ListenerError::Close { addr, source })?;
        drop(closed);
        self.reporter.listener_stopped(addr);
        self.drain(&connections).await;
        Ok(())
    }

    fn admit(&self, connections: &TaskTracker, stream: TcpStream, peer: SocketAddr) {
        if self.circuit.state().is_open() {
            self.reporter.connection_refused(peer);
            drop(stream);
            return;
        }
        debug!(target: LISTENER_TARGET, %peer, "connection admitted");
        let handler = SessionHandler::new(
            Arc::clone(&self.router),
            Arc::clone(&self.auth),
            peer.to_string(),
        );
        connections.spawn(run_connection(
            Arc::clone(&self.ssh_config),
            Arc::clone(&self.reporter),
            handler,
            stream,
            peer,
        ));
    }

    async fn drain(&self, connections: &TaskTracker) {
        connections.close();
        if connections.is_empty() {
            return;
        }
        info!(
            target: LISTENER_TARGET,
            live = connections.len(),
            timeout_ms = self.drain_timeout.as_millis(),
            "waiting for live connections"
        );
        if tokio::time::timeout(self.drain_timeout, connections.wait())
            .await
            .is_err()
        {
            warn!(
                target: LISTENER_TARGET,
                live = connections.len(),
                "drain timeout elapsed; leaving connections to finish"
            );
        }
    }
}

async fn run_connection(
    config: Arc<SshConfig>,
    reporter: Arc<dyn HealthReporter>,
    handler: SessionHandler,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let authenticated = handler.authenticated();
    let session = match russh::server::run_stream(config, stream, handler).await {
        Ok(session) => session,
        Err(error) => {
            reporter.handshake_failed(peer, &error);
            return;
        }
    };
    match session.await {
        Ok(()) => debug!(target: LISTENER_TARGET, %peer, "connection closed"),
        Err(error) if error.is_disconnect() => {
            debug!(target: LISTENER_TARGET, %peer, "client disconnected");
        }
        Err(error) if authenticated.load(Ordering::Acquire) => {
            reporter.session_failed(peer, &error);
        }
        Err(error) => reporter.handshake_failed(peer, &error),
    }
}
