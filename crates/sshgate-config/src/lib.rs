//! Shared configuration for the sshgate gateway.
//!
//! [`Config`] is layered by `ortho_config`: built-in defaults, then a TOML
//! file (`--config-path` or `SSHGATE_CONFIG_PATH`), then `SSHGATE_*`
//! environment variables, then command-line flags. Later layers win.
//!
//! The gateway consumes this type only at construction time; nothing here is
//! re-read while serving.

mod defaults;
mod listen;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_INACTIVITY_TIMEOUT_SECS, DEFAULT_LOG_FILTER,
    DEFAULT_PORT, default_drain_timeout_ms, default_inactivity_timeout_secs,
    default_listen_address, default_log_filter, default_log_filter_string, default_log_format,
};
pub use listen::{ListenAddress, ListenAddressParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SSHGATE")]
pub struct Config {
    /// Address the SSH listener binds.
    #[serde(default = "default_listen_address")]
    #[ortho_config(default = default_listen_address())]
    pub listen_address: ListenAddress,
    /// OpenSSH-format private host key. Absent means an ephemeral key.
    #[serde(default)]
    pub host_key_path: Option<Utf8PathBuf>,
    /// `authorized_keys` file gating public-key logins. Absent means
    /// anonymous access.
    #[serde(default)]
    pub authorized_keys_path: Option<Utf8PathBuf>,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Milliseconds shutdown waits for live connections to finish.
    #[serde(default = "default_drain_timeout_ms")]
    #[ortho_config(default = default_drain_timeout_ms())]
    pub drain_timeout_ms: u64,
    /// Seconds of inactivity after which a connection is dropped.
    #[serde(default = "default_inactivity_timeout_secs")]
    #[ortho_config(default = default_inactivity_timeout_secs())]
    pub inactivity_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            host_key_path: None,
            authorized_keys_path: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            drain_timeout_ms: default_drain_timeout_ms(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

impl Config {
    /// Address the listener binds.
    #[must_use]
    pub const fn listen_address(&self) -> &ListenAddress {
        &self.listen_address
    }

    /// Configured host key file, if any.
    #[must_use]
    pub fn host_key_path(&self) -> Option<&Utf8Path> {
        self.host_key_path.as_deref()
    }

    /// Configured `authorized_keys` file, if any.
    #[must_use]
    pub fn authorized_keys_path(&self) -> Option<&Utf8Path> {
        self.authorized_keys_path.as_deref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Shutdown drain budget.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Idle connection timeout.
    #[must_use]
    pub const fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}
