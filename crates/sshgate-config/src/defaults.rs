use crate::listen::ListenAddress;
use crate::logging::LogFormat;

/// Port the gateway listens on when none is configured.
pub const DEFAULT_PORT: u16 = 2223;

/// Host the gateway binds when none is configured.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Milliseconds shutdown waits for in-flight connections.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Seconds an idle SSH connection is kept before being dropped.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 600;

/// Default listen address, `0.0.0.0:2223`.
#[must_use]
pub fn default_listen_address() -> ListenAddress {
    ListenAddress::new(DEFAULT_HOST, DEFAULT_PORT)
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value for serde defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log output format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default shutdown drain budget in milliseconds.
#[must_use]
pub const fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

/// Default idle timeout in seconds.
#[must_use]
pub const fn default_inactivity_timeout_secs() -> u64 {
    DEFAULT_INACTIVITY_TIMEOUT_SECS
}

