use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// TCP address the gateway listener binds to.
///
/// The host is kept unresolved so names such as `localhost` are looked up at
/// bind time rather than when the configuration loads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl ListenAddress {
    /// Builds an address from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port. Zero asks the operating system for an ephemeral port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(formatter, "[{}]:{}", self.host, self.port)
        } else {
            write!(formatter, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ListenAddress {
    type Err = ListenAddressParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (raw_host, raw_port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| ListenAddressParseError::MissingPort(input.to_owned()))?;

        let host = match raw_host.strip_prefix('[') {
            Some(inner) => inner
                .strip_suffix(']')
                .ok_or_else(|| ListenAddressParseError::UnterminatedBracket(input.to_owned()))?,
            None if raw_host.contains(':') => {
                return Err(ListenAddressParseError::UnbracketedIpv6(input.to_owned()));
            }
            None => raw_host,
        };
        if host.is_empty() {
            return Err(ListenAddressParseError::MissingHost(input.to_owned()));
        }
        if raw_port.is_empty() {
            return Err(ListenAddressParseError::MissingPort(input.to_owned()));
        }

        let port = raw_port
            .parse::<u16>()
            .map_err(|source| ListenAddressParseError::InvalidPort {
                input: input.to_owned(),
                source,
            })?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ListenAddress {
    type Error = ListenAddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenAddress> for String {
    fn from(value: ListenAddress) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing a [`ListenAddress`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListenAddressParseError {
    /// No host precedes the port separator.
    #[error("missing host in listen address '{0}'")]
    MissingHost(String),
    /// The address carries no `:port` suffix.
    #[error("missing port in listen address '{0}'")]
    MissingPort(String),
    /// The port is not a number in `0..=65535`.
    #[error("invalid port in listen address '{input}': {source}")]
    InvalidPort {
        /// Address as supplied.
        input: String,
        /// Integer parse failure.
        #[source]
        source: std::num::ParseIntError,
    },
    /// An IPv6 literal opened a bracket it never closed.
    #[error("unterminated '[' in listen address '{0}'")]
    UnterminatedBracket(String),
    /// An IPv6 literal was given without brackets, making the port ambiguous.
    #[error("IPv6 listen address '{0}' must be written as [host]:port")]
    UnbracketedIpv6(String),
}
