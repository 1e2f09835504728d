//! Error types for command registration and dispatch.

use thiserror::Error;

use super::route::StepError;

/// Exit status reported when the command name matches no route.
pub const EXIT_COMMAND_NOT_FOUND: u32 = 127;
/// Exit status reported for every other dispatch failure.
pub const EXIT_FAILURE: u32 = 1;

/// Errors raised while building a [`CommandRegistry`](super::CommandRegistry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A route with the same name is already registered.
    #[error("route '{name}' is already registered")]
    DuplicateRoute {
        /// Conflicting route name.
        name: String,
    },
}

/// Errors surfaced while turning an exec request into a route invocation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No route is registered under the requested name.
    #[error("unknown command: {name}")]
    CommandNotFound {
        /// Name as sent by the client.
        name: String,
    },

    /// A pipeline step failed; later steps did not run.
    #[error("{route}: step '{step}' failed: {source}")]
    Execution {
        /// Route being executed.
        route: String,
        /// Name of the failing step.
        step: String,
        /// Failure reported by the step.
        #[source]
        source: StepError,
    },

    /// The exec payload could not be read as a command line.
    #[error("malformed command: {reason}")]
    MalformedCommand {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The worker running the pipeline stopped before producing a result.
    #[error("command '{command}' was aborted")]
    Aborted {
        /// Command whose worker stopped.
        command: String,
    },
}

impl DispatchError {
    /// Returns the exit status sent to the client for this error.
    ///
    /// Unknown commands report 127, as POSIX shells do. Everything else
    /// reports 1.
    #[must_use]
    pub const fn exit_status(&self) -> u32 {
        match self {
            Self::CommandNotFound { .. } => EXIT_COMMAND_NOT_FOUND,
            Self::Execution { .. } | Self::MalformedCommand { .. } | Self::Aborted { .. } => {
                EXIT_FAILURE
            }
        }
    }

    /// Creates a command-not-found error.
    #[must_use]
    pub fn command_not_found(name: impl Into<String>) -> Self {
        Self::CommandNotFound { name: name.into() }
    }

    /// Creates a malformed command error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedCommand {
            reason: reason.into(),
        }
    }

    /// Creates an aborted-worker error.
    #[must_use]
    pub fn aborted(command: impl Into<String>) -> Self {
        Self::Aborted {
            command: command.into(),
        }
    }

    /// Name of the failing step, when a step failed.
    #[must_use]
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::Execution { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Outcome of one dispatch, produced exactly once and never retried.
#[derive(Debug, PartialEq, Eq)]
pub struct DispatchResult {
    output: Vec<u8>,
    error: Option<DispatchError>,
}

impl DispatchResult {
    /// Successful result carrying the response body.
    #[must_use]
    pub const fn success(output: Vec<u8>) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// Failed result. Failures never carry partial output.
    #[must_use]
    pub const fn failure(error: DispatchError) -> Self {
        Self {
            output: Vec::new(),
            error: Some(error),
        }
    }

    /// Returns true when every step succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Exit status for the client: 0 on success.
    #[must_use]
    pub fn exit_status(&self) -> u32 {
        self.error.as_ref().map_or(0, DispatchError::exit_status)
    }

    /// Response body published by the final step.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Failure, when the dispatch failed.
    #[must_use]
    pub const fn error(&self) -> Option<&DispatchError> {
        self.error.as_ref()
    }

    /// Converts into a `Result` of the output body.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] carried by a failed result.
    pub fn into_result(self) -> Result<Vec<u8>, DispatchError> {
        self.error.map_or(Ok(self.output), Err)
    }
}

impl From<DispatchError> for DispatchResult {
    fn from(error: DispatchError) -> Self {
        Self::failure(error)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DispatchError::command_not_found("illegal"), 127)]
    #[case(DispatchError::malformed("empty command line"), 1)]
    #[case(DispatchError::aborted("ping"), 1)]
    #[case(
        DispatchError::Execution {
            route: "deploy".to_owned(),
            step: "apply".to_owned(),
            source: StepError::failed("boom"),
        },
        1
    )]
    fn maps_errors_to_exit_status(#[case] error: DispatchError, #[case] expected: u32) {
        assert_eq!(error.exit_status(), expected);
        assert_eq!(DispatchResult::failure(error).exit_status(), expected);
    }

    #[rstest]
    fn execution_error_names_the_step() {
        let error = DispatchError::Execution {
            route: "deploy".to_owned(),
            step: "apply".to_owned(),
            source: StepError::failed("boom"),
        };
        assert_eq!(error.failed_step(), Some("apply"));
        assert_eq!(error.to_string(), "deploy: step 'apply' failed: boom");
    }

    #[rstest]
    fn success_reports_zero_and_keeps_output() {
        let result = DispatchResult::success(b"pong".to_vec());
        assert!(result.is_success());
        assert_eq!(result.exit_status(), 0);
        assert_eq!(result.into_result(), Ok(b"pong".to_vec()));
    }
}
