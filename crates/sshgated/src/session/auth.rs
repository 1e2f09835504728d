//! Client authentication policy.

use std::collections::HashSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use russh::MethodSet;
use russh::server::Auth;
use russh_keys::key::PublicKey;
use thiserror::Error;

/// Errors raised while loading an `authorized_keys` file.
#[derive(Debug, Error)]
pub enum AuthPolicyError {
    /// The file could not be read.
    #[error("failed to read authorized keys {path}: {source}")]
    Read {
        /// File being read.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// A line could not be parsed as a public key.
    #[error("{path}:{line}: {reason}")]
    Parse {
        /// File being read.
        path: Utf8PathBuf,
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },
}

/// Who a connection authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user: String,
    fingerprint: Option<String>,
}

impl Identity {
    /// Identity for a `none` login.
    #[must_use]
    pub fn anonymous(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            fingerprint: None,
        }
    }

    /// Identity for a public-key login.
    #[must_use]
    pub fn with_key(user: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            fingerprint: Some(fingerprint.into()),
        }
    }

    /// User name supplied by the client.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// SHA-256 fingerprint of the accepted key, for public-key logins.
    #[must_use]
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

/// Which clients may open sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Anyone may log in with the `none` method.
    Anonymous,
    /// Only keys whose fingerprint is listed may log in.
    AuthorizedKeys {
        /// SHA-256 fingerprints of accepted keys.
        fingerprints: HashSet<String>,
    },
}

impl AuthPolicy {
    /// Policy built from an optional `authorized_keys` file. No file means
    /// anonymous access.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_config(path: Option<&Utf8Path>) -> Result<Self, AuthPolicyError> {
        path.map_or(Ok(Self::Anonymous), Self::load_authorized_keys)
    }

    /// Loads an `authorized_keys` file.
    ///
    /// Blank lines and `#` comments are skipped. Every other line must be
    /// `<type> <base64> [comment]`; option prefixes are not supported.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or a line is invalid.
    pub fn load_authorized_keys(path: &Utf8Path) -> Result<Self, AuthPolicyError> {
        let contents = fs::read_to_string(path).map_err(|source| AuthPolicyError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse_authorized_keys(path, &contents)
    }

    fn parse_authorized_keys(path: &Utf8Path, contents: &str) -> Result<Self, AuthPolicyError> {
        let mut fingerprints = HashSet::new();
        for (index, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let key = parse_key_line(line).map_err(|reason| AuthPolicyError::Parse {
                path: path.to_owned(),
                line: index + 1,
                reason,
            })?;
            fingerprints.insert(key.fingerprint());
        }
        Ok(Self::AuthorizedKeys { fingerprints })
    }

    /// Authentication methods advertised to clients.
    #[must_use]
    pub const fn methods(&self) -> MethodSet {
        match self {
            Self::Anonymous => MethodSet::NONE,
            Self::AuthorizedKeys { .. } => MethodSet::PUBLICKEY,
        }
    }

    /// Decides a `none` login attempt.
    #[must_use]
    pub fn check_none(&self, user: &str) -> Option<Identity> {
        matches!(self, Self::Anonymous).then(|| Identity::anonymous(user))
    }

    /// Decides a public-key login attempt. The signature itself is verified
    /// by the transport before this is consulted.
    #[must_use]
    pub fn check_key(&self, user: &str, key: &PublicKey) -> Option<Identity> {
        let Self::AuthorizedKeys { fingerprints } = self else {
            return None;
        };
        let fingerprint = key.fingerprint();
        fingerprints
            .contains(&fingerprint)
            .then(|| Identity::with_key(user, fingerprint))
    }

    /// Rejection answer that points the client at the accepted methods.
    pub(crate) const fn reject(&self) -> Auth {
        Auth::Reject {
            proceed_with_methods: Some(self.methods()),
        }
    }
}

fn parse_key_line(line: &str) -> Result<PublicKey, String> {
    let mut fields = line.split_whitespace();
    let algorithm = fields.next().unwrap_or_default();
    if !is_key_algorithm(algorithm) {
        return Err(format!(
            "expected a key type, found '{algorithm}' (key options are not supported)"
        ));
    }
    let encoded = fields
        .next()
        .ok_or_else(|| format!("missing key data after '{algorithm}'"))?;
    russh_keys::parse_public_key_base64(encoded).map_err(|error| format!("invalid key: {error}"))
}

fn is_key_algorithm(field: &str) -> bool {
    ["ssh-", "ecdsa-sha2-", "sk-"]
        .iter()
        .any(|prefix| field.starts_with(prefix))
}
