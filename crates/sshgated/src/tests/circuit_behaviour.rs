//! Behavioural tests for circuit gating and shutdown.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use russh::client;
use tokio::runtime::Runtime;

use crate::transport::ListenerError;

use super::support::{HealthEvent, RunningGateway, TestClient, default_router, run};

// Fields drop in order; the runtime goes last.
struct CircuitWorld {
    gateway: Option<RunningGateway>,
    addr: Option<SocketAddr>,
    client: Option<client::Handle<TestClient>>,
    served: Option<Result<(), ListenerError>>,
    runtime: Runtime,
}

impl CircuitWorld {
    fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("build runtime");
        Self {
            gateway: None,
            addr: None,
            client: None,
            served: None,
            runtime,
        }
    }

    fn gateway(&self) -> &RunningGateway {
        self.gateway.as_ref().expect("gateway started")
    }

    fn start(&mut self) {
        let gateway = self
            .runtime
            .block_on(async { RunningGateway::start(default_router()) });
        self.addr = Some(gateway.addr);
        self.gateway = Some(gateway);
    }

    fn stop(&mut self) {
        let gateway = self.gateway.take().expect("gateway started");
        self.served = Some(self.runtime.block_on(gateway.stop()));
    }

    fn connection_refused(&self) -> bool {
        let addr = self.addr.expect("gateway started");
        self.runtime.block_on(async {
            let config = Arc::new(client::Config::default());
            client::connect(config, addr, TestClient).await.is_err()
        })
    }

    fn ping_output(&self, session: &client::Handle<TestClient>, command: &str) -> String {
        self.runtime
            .block_on(run(session, command))
            .stdout_text()
    }
}

#[fixture]
fn world() -> RefCell<CircuitWorld> {
    RefCell::new(CircuitWorld::new())
}

#[given("a running gateway")]
fn given_running_gateway(world: &RefCell<CircuitWorld>) {
    world.borrow_mut().start();
}

#[given("a logged-in client")]
fn given_logged_in_client(world: &RefCell<CircuitWorld>) {
    let mut state = world.borrow_mut();
    let session = state.runtime.block_on(state.gateway().login());
    state.client = Some(session);
}

#[when("the circuit is tripped")]
fn when_circuit_tripped(world: &RefCell<CircuitWorld>) {
    world.borrow().gateway().circuit.trip();
}

#[when("the circuit is reset")]
fn when_circuit_reset(world: &RefCell<CircuitWorld>) {
    world.borrow().gateway().circuit.reset();
}

#[when("the gateway is shut down")]
fn when_gateway_shut_down(world: &RefCell<CircuitWorld>) {
    world.borrow_mut().stop();
}

#[then("a new connection is refused")]
fn then_connection_refused(world: &RefCell<CircuitWorld>) {
    assert!(
        world.borrow().connection_refused(),
        "connection was admitted"
    );
}

#[then("the reporter recorded a refused connection")]
fn then_reporter_refused(world: &RefCell<CircuitWorld>) {
    let events = world.borrow().gateway().reporter.events();
    assert!(
        events.contains(&HealthEvent::ConnectionRefused),
        "refusal event missing: {events:?}"
    );
}

#[then(r#"a new client running "{command}" reads "{expected}""#)]
fn then_new_client_reads(world: &RefCell<CircuitWorld>, command: String, expected: String) {
    let state = world.borrow();
    let session = state.runtime.block_on(state.gateway().login());
    assert_eq!(state.ping_output(&session, &command), expected);
}

#[then(r#"the logged-in client running "{command}" reads "{expected}""#)]
fn then_logged_in_client_reads(world: &RefCell<CircuitWorld>, command: String, expected: String) {
    let state = world.borrow();
    let session = state.client.as_ref().expect("client logged in");
    assert_eq!(state.ping_output(session, &command), expected);
}

#[then("serving ended without error")]
fn then_serving_ended(world: &RefCell<CircuitWorld>) {
    let state = world.borrow();
    let served = state.served.as_ref().expect("gateway stopped");
    assert!(served.is_ok(), "serve failed: {served:?}");
}

#[scenario(path = "tests/features/gateway_circuit.feature")]
fn gateway_circuit(world: RefCell<CircuitWorld>) {
    let _ = world;
}
