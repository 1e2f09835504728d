//! Operating system signals driving the circuit and shutdown.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::flag;
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use crate::circuit::{Circuit, CircuitState};
use crate::health::HealthReporter;
use crate::transport::ShutdownHandle;

const SUPERVISED_SIGNALS: [i32; 6] = [SIGUSR1, SIGUSR2, SIGTERM, SIGINT, SIGQUIT, SIGHUP];
const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];
/// Exit status used when a second termination signal interrupts the drain.
const FORCED_EXIT_STATUS: i32 = 1;

/// Errors reported while installing signal supervision.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The supervisor thread could not be spawned.
    #[error("failed to spawn signal supervisor: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// What a supervised signal asks the gateway to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalAction {
    /// Refuse new connections.
    Trip,
    /// Admit new connections again.
    Reset,
    /// Stop accepting and drain.
    Shutdown,
}

impl SignalAction {
    pub(crate) const fn from_signal(signal: i32) -> Option<Self> {
        match signal {
            SIGUSR1 => Some(Self::Trip),
            SIGUSR2 => Some(Self::Reset),
            SIGTERM | SIGINT | SIGQUIT | SIGHUP => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// Applies `action`, reporting circuit transitions that changed the state.
pub(crate) fn apply_action(
    action: SignalAction,
    circuit: &Circuit,
    shutdown: &ShutdownHandle,
    reporter: &dyn HealthReporter,
) {
    let (previous, current) = match action {
        SignalAction::Trip => (circuit.trip(), CircuitState::Open),
        SignalAction::Reset => (circuit.reset(), CircuitState::Closed),
        SignalAction::Shutdown => {
            shutdown.trigger();
            return;
        }
    };
    if previous == current {
        info!(target: PROCESS_TARGET, state = %current, "circuit already in requested state");
    } else {
        reporter.circuit_changed(previous, current);
    }
}

/// Background thread translating signals into circuit and shutdown actions.
///
/// The thread ends after the first shutdown signal or when
/// [`SignalSupervisor::stop`] is called. The first termination signal also
/// arms an immediate exit, so a second one ends the process even while the
/// drain is still running.
pub(crate) struct SignalSupervisor {
    handle: Handle,
    thread: JoinHandle<()>,
    terminating: Arc<AtomicBool>,
}

impl SignalSupervisor {
    pub(crate) fn start(
        circuit: Arc<Circuit>,
        shutdown: ShutdownHandle,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, ShutdownError> {
        let terminating = arm_forced_exit()?;
        let mut signals =
            Signals::new(SUPERVISED_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("sshgated-signals".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    let Some(action) = SignalAction::from_signal(signal) else {
                        continue;
                    };
                    info!(target: PROCESS_TARGET, signal, ?action, "signal received");
                    apply_action(action, &circuit, &shutdown, reporter.as_ref());
                    if action == SignalAction::Shutdown {
                        break;
                    }
                }
            })
            .map_err(|source| ShutdownError::Spawn { source })?;
        Ok(Self {
            handle,
            thread,
            terminating,
        })
    }

    #[cfg(test)]
    fn exit_armed(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// Closes signal delivery and joins the thread. The forced exit stays
    /// armed for the rest of the process.
    pub(crate) fn stop(self) {
        self.handle.close();
        if self.thread.join().is_err() {
            warn!(target: PROCESS_TARGET, "signal supervisor panicked");
        }
        let by_signal = self.terminating.load(Ordering::SeqCst);
        debug!(target: PROCESS_TARGET, by_signal, "signal supervisor stopped");
    }
}

/// Registers, per termination signal, an exit action followed by a flag
/// setter. The exit action only fires once the flag is already set, which
/// makes the second signal fatal.
fn arm_forced_exit() -> Result<Arc<AtomicBool>, ShutdownError> {
    let terminating = Arc::new(AtomicBool::new(false));
    for signal in TERMINATION_SIGNALS {
        flag::register_conditional_shutdown(signal, FORCED_EXIT_STATUS, Arc::clone(&terminating))
            .map_err(|source| ShutdownError::Install { source })?;
        flag::register(signal, Arc::clone(&terminating))
            .map_err(|source| ShutdownError::Install { source })?;
    }
    Ok(terminating)
}
