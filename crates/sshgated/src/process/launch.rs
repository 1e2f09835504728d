//! Supervises gateway launch sequencing and runtime orchestration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::circuit::Circuit;
use crate::dispatch::builtin;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::session;
use crate::transport::{Gateway, GatewayListener, ShutdownHandle};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::signals::SignalSupervisor;

/// Runs the gateway using the production collaborators.
///
/// # Errors
///
/// Returns the first launch step that failed, or a listener error raised
/// while serving.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
    )
}

/// Runs the gateway with injected collaborators until a shutdown signal.
pub(crate) fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let (config, host_key, auth, reporter) = daemon.into_parts();
    info!(
        target: PROCESS_TARGET,
        listen_address = %config.listen_address(),
        "starting gateway runtime"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sshgated-worker")
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;

    let router = Arc::new(builtin::default_registry()?.into_router());
    let ssh_config = Arc::new(session::server_config(
        host_key,
        &auth,
        config.inactivity_timeout(),
    ));
    let circuit = Arc::new(Circuit::new());
    let listener = GatewayListener::bind(config.listen_address())?;
    let shutdown = ShutdownHandle::new();
    let supervisor = SignalSupervisor::start(
        Arc::clone(&circuit),
        shutdown.clone(),
        Arc::clone(&reporter),
    )?;

    let gateway = Gateway::new(router, circuit, ssh_config)
        .with_auth(Arc::new(auth))
        .with_reporter(reporter)
        .with_drain_timeout(config.drain_timeout());
    let served = runtime.block_on(gateway.serve(listener, shutdown));
    supervisor.stop();
    stop_runtime(runtime, config.drain_timeout());
    served?;

    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}

/// Shuts the runtime down, abandoning blocking dispatch workers still
/// running after `grace`.
fn stop_runtime(runtime: Runtime, grace: Duration) {
    let started = Instant::now();
    runtime.shutdown_timeout(grace);
    let elapsed = started.elapsed();
    if elapsed >= grace {
        warn!(
            target: PROCESS_TARGET,
            ?grace,
            ?elapsed,
            "abandoned dispatch workers still running at shutdown"
        );
    }
}
