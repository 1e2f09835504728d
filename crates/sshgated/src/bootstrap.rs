//! Gateway bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use russh_keys::key::KeyPair;
use thiserror::Error;

use sshgate_config::Config;

use crate::health::HealthReporter;
use crate::host_key::{self, HostKeyError};
use crate::session::{AuthPolicy, AuthPolicyError};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when no valid configuration can be assembled.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The host key could not be loaded.
    #[error("failed to prepare host key: {source}")]
    HostKey {
        /// Underlying key error.
        #[source]
        source: HostKeyError,
    },
    /// The `authorized_keys` file could not be loaded.
    #[error("failed to load authentication policy: {source}")]
    AuthPolicy {
        /// Underlying policy error.
        #[source]
        source: AuthPolicyError,
    },
}

/// Everything a gateway needs before it binds its socket.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    host_key: KeyPair,
    auth: AuthPolicy,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Reporter shared with the gateway.
    #[must_use]
    pub fn reporter(&self) -> Arc<dyn HealthReporter> {
        Arc::clone(&self.reporter)
    }

    /// Authentication policy derived from the configuration.
    #[must_use]
    pub const fn auth(&self) -> &AuthPolicy {
        &self.auth
    }

    /// Splits the daemon into the parts the gateway consumes.
    #[must_use]
    pub fn into_parts(self) -> (Config, KeyPair, AuthPolicy, Arc<dyn HealthReporter>) {
        (self.config, self.host_key, self.auth, self.reporter)
    }
}

/// Bootstraps the gateway using the supplied collaborators.
///
/// Steps run in order: configuration, telemetry, host key, authentication
/// policy. The first failure is reported and returned.
///
/// # Errors
///
/// Returns the first step that failed.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    let host_key = host_key::load_host_key(config.host_key_path())
        .map_err(|source| fail(BootstrapError::HostKey { source }))?;
    let auth = AuthPolicy::from_config(config.authorized_keys_path())
        .map_err(|source| fail(BootstrapError::AuthPolicy { source }))?;

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        telemetry,
        reporter,
        host_key,
        auth,
    })
}
