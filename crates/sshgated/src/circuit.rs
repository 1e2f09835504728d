//! Gate controlling whether the listener admits new connections.
//!
//! A [`Circuit`] is shared by reference between the listener, which only
//! reads it, and whatever supervises the backing resource, which trips and
//! resets it. Transitions are explicit: nothing moves the circuit back to
//! [`CircuitState::Closed`] except a call to [`Circuit::reset`].

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Observable states of a [`Circuit`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// New connections are accepted.
    #[default]
    Closed,
    /// New connections are refused before the SSH handshake.
    Open,
}

impl CircuitState {
    /// Returns true when new connections must be refused.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Concurrency-safe two-state gate.
///
/// All reads and writes go through one mutex, so a [`Circuit::state`] call
/// that starts after a transition returned always observes that transition.
#[derive(Debug, Default)]
pub struct Circuit {
    state: Mutex<CircuitState>,
}

impl Circuit {
    /// Creates a circuit in the [`CircuitState::Closed`] state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last committed state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        *self.guard()
    }

    /// Opens the circuit, refusing new connections. Returns the prior state.
    pub fn trip(&self) -> CircuitState {
        self.transition(CircuitState::Open)
    }

    /// Closes the circuit, admitting new connections. Returns the prior state.
    pub fn reset(&self) -> CircuitState {
        self.transition(CircuitState::Closed)
    }

    fn transition(&self, next: CircuitState) -> CircuitState {
        let mut state = self.guard();
        std::mem::replace(&mut *state, next)
    }

    // A panic cannot leave a half-written `CircuitState`, so poisoning is
    // ignored.
    fn guard(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn circuit() -> Circuit {
        Circuit::new()
    }

    #[rstest]
    fn starts_closed(circuit: Circuit) {
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(!circuit.state().is_open());
    }

    #[rstest]
    fn trip_opens_and_reset_closes(circuit: Circuit) {
        assert_eq!(circuit.trip(), CircuitState::Closed);
        assert_eq!(circuit.state(), CircuitState::Open);
        assert_eq!(circuit.reset(), CircuitState::Open);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[rstest]
    fn transitions_are_idempotent(circuit: Circuit) {
        circuit.trip();
        assert_eq!(circuit.trip(), CircuitState::Open);
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.reset();
        assert_eq!(circuit.reset(), CircuitState::Closed);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[rstest]
    fn concurrent_transitions_settle_on_last_writer() {
        let circuit = Arc::new(Circuit::new());
        let workers: Vec<_> = [true, false]
            .into_iter()
            .cycle()
            .take(8)
            .map(|trips| {
                let worker_circuit = Arc::clone(&circuit);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        if trips {
                            worker_circuit.trip();
                        } else {
                            worker_circuit.reset();
                        }
                        let observed = worker_circuit.state();
                        assert!(matches!(
                            observed,
                            CircuitState::Open | CircuitState::Closed
                        ));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread panicked");
        }

        circuit.trip();
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[rstest]
    fn displays_lowercase_names() {
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::Closed.to_string(), "closed");
    }
}
