//! Test harness shared by the end-to-end and behavioural suites.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ortho_config::{OrthoConfig, OrthoError};
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg};
use russh_keys::key::{KeyPair, PublicKey};
use tokio::task::JoinHandle;

use sshgate_config::{Config, ListenAddress, LogFormat};

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::circuit::{Circuit, CircuitState};
use crate::dispatch::{Router, builtin};
use crate::health::HealthReporter;
use crate::session::{self, AuthPolicy, SessionError};
use crate::transport::{Gateway, GatewayListener, ListenerError, ShutdownHandle};

/// Upper bound for any single network wait in the suites.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// User name every test client logs in as.
pub const TEST_USER: &str = "deis";

/// Events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ListenerStarted(SocketAddr),
    ListenerStopped(SocketAddr),
    ConnectionRefused,
    HandshakeFailed,
    SessionFailed,
    CircuitChanged(CircuitState, CircuitState),
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Waits until an event matching `predicate` has been recorded.
    pub async fn wait_for(&self, predicate: impl Fn(&HealthEvent) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.events().iter().any(&predicate) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn listener_started(&self, addr: SocketAddr) {
        self.record(HealthEvent::ListenerStarted(addr));
    }

    fn listener_stopped(&self, addr: SocketAddr) {
        self.record(HealthEvent::ListenerStopped(addr));
    }

    fn connection_refused(&self, _peer: SocketAddr) {
        self.record(HealthEvent::ConnectionRefused);
    }

    fn handshake_failed(&self, _peer: SocketAddr, _error: &SessionError) {
        self.record(HealthEvent::HandshakeFailed);
    }

    fn session_failed(&self, _peer: SocketAddr, _error: &SessionError) {
        self.record(HealthEvent::SessionFailed);
    }

    fn circuit_changed(&self, previous: CircuitState, current: CircuitState) {
        self.record(HealthEvent::CircuitChanged(previous, current));
    }
}

/// Loader returning quiet defaults with an ephemeral host key.
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            listen_address: ListenAddress::new("127.0.0.1", 0),
            log_filter: "warn".to_owned(),
            log_format: LogFormat::Compact,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an invalid CLI argument.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("sshgated"),
            OsString::from("--drain-timeout-ms"),
            OsString::from("soon"),
        ];
        Config::load_from_iter(args)
    }
}

/// Client handler trusting whatever host key the gateway presents.
pub struct TestClient;

#[async_trait]
impl client::Handler for TestClient {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Channel request replies observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Success,
    Failure,
}

/// Everything the gateway sent on one channel until it closed.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_status: Option<u32>,
    pub replies: Vec<Reply>,
    pub closed: bool,
}

impl ExecOutcome {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Reads channel messages until the gateway closes the channel.
pub async fn collect(channel: &mut Channel<Msg>) -> ExecOutcome {
    let mut outcome = ExecOutcome::default();
    loop {
        let message = tokio::time::timeout(STEP_TIMEOUT, channel.wait())
            .await
            .expect("gateway should answer before the timeout");
        match message {
            None | Some(ChannelMsg::Close) => {
                outcome.closed = true;
                return outcome;
            }
            Some(ChannelMsg::Data { data }) => outcome.stdout.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                outcome.stderr.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => outcome.exit_status = Some(exit_status),
            Some(ChannelMsg::Success) => outcome.replies.push(Reply::Success),
            Some(ChannelMsg::Failure) => outcome.replies.push(Reply::Failure),
            Some(_) => {}
        }
    }
}

/// Opens a channel, sets `env`, runs `command` and collects the outcome.
pub async fn run_with_env(
    session: &client::Handle<TestClient>,
    env: &[(&str, &str)],
    command: &str,
) -> ExecOutcome {
    let mut channel = session
        .channel_open_session()
        .await
        .expect("open session channel");
    for (name, value) in env {
        channel
            .set_env(true, *name, *value)
            .await
            .expect("send env request");
    }
    channel.exec(true, command).await.expect("send exec request");
    collect(&mut channel).await
}

/// Opens a channel, runs `command` and collects the outcome.
pub async fn run(session: &client::Handle<TestClient>, command: &str) -> ExecOutcome {
    run_with_env(session, &[], command).await
}

/// Router holding the built-in routes.
pub fn default_router() -> Router {
    builtin::default_registry()
        .expect("built-in routes register")
        .into_router()
}

/// A gateway serving on an ephemeral loopback port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub circuit: Arc<Circuit>,
    pub reporter: Arc<RecordingHealthReporter>,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<(), ListenerError>>,
}

impl RunningGateway {
    /// Starts an anonymous gateway. Must be called inside a tokio runtime.
    pub fn start(router: Router) -> Self {
        Self::start_with_auth(router, AuthPolicy::Anonymous)
    }

    /// Starts a gateway enforcing `auth`.
    pub fn start_with_auth(router: Router, auth: AuthPolicy) -> Self {
        let ssh_config = Arc::new(session::server_config(
            KeyPair::generate_ed25519().expect("generate host key"),
            &auth,
            Duration::from_secs(30),
        ));
        let listener =
            GatewayListener::bind(&ListenAddress::new("127.0.0.1", 0)).expect("bind loopback");
        let addr = listener.local_addr();
        let circuit = Arc::new(Circuit::new());
        let reporter = Arc::new(RecordingHealthReporter::default());
        let shutdown = ShutdownHandle::new();

        let gateway = Gateway::new(Arc::new(router), Arc::clone(&circuit), ssh_config)
            .with_auth(Arc::new(auth))
            .with_reporter(reporter.clone())
            .with_drain_timeout(Duration::from_millis(200));
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move { gateway.serve(listener, serve_shutdown).await });

        Self {
            addr,
            circuit,
            reporter,
            shutdown,
            task,
        }
    }

    /// Connects without authenticating.
    pub async fn connect(&self) -> Result<client::Handle<TestClient>, russh::Error> {
        let config = Arc::new(client::Config::default());
        tokio::time::timeout(STEP_TIMEOUT, client::connect(config, self.addr, TestClient))
            .await
            .unwrap_or(Err(russh::Error::ConnectionTimeout))
    }

    /// Connects and authenticates with the `none` method.
    pub async fn login(&self) -> client::Handle<TestClient> {
        let mut session = self.connect().await.expect("connect to gateway");
        let accepted = session
            .authenticate_none(TEST_USER)
            .await
            .expect("authentication exchange");
        assert!(accepted, "anonymous login should be accepted");
        session
    }

    /// Triggers shutdown and returns what `serve` returned.
    pub async fn stop(self) -> Result<(), ListenerError> {
        self.shutdown.trigger();
        tokio::time::timeout(STEP_TIMEOUT, self.task)
            .await
            .expect("serve should return after shutdown")
            .expect("serve task should not panic")
    }
}
