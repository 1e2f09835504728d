//! Host key loading.

use camino::{Utf8Path, Utf8PathBuf};
use russh_keys::key::KeyPair;
use thiserror::Error;
use tracing::{info, warn};

const HOST_KEY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host_key");

/// Errors raised while loading the host key.
#[derive(Debug, Error)]
pub enum HostKeyError {
    /// No ephemeral key could be generated.
    #[error("failed to generate an ephemeral host key")]
    Generate,
    /// The key file could not be read or decoded.
    #[error("failed to load host key {path}: {source}")]
    Load {
        /// Key file as configured.
        path: Utf8PathBuf,
        /// Decoder failure.
        #[source]
        source: russh_keys::Error,
    },
}

/// Loads the configured host key, or generates an ephemeral ed25519 key when
/// none is configured. Ephemeral keys change on every start, so clients that
/// pin host keys will see a mismatch after a restart.
///
/// # Errors
///
/// Returns an error when a configured key cannot be loaded. Encrypted keys
/// are not supported.
pub fn load_host_key(configured: Option<&Utf8Path>) -> Result<KeyPair, HostKeyError> {
    let Some(path) = configured else {
        let key = KeyPair::generate_ed25519().ok_or(HostKeyError::Generate)?;
        warn!(
            target: HOST_KEY_TARGET,
            "no host key configured; generated an ephemeral ed25519 key"
        );
        return Ok(key);
    };
    let key = russh_keys::load_secret_key(path, None).map_err(|source| HostKeyError::Load {
        path: path.to_owned(),
        source,
    })?;
    info!(target: HOST_KEY_TARGET, %path, algorithm = key.name(), "host key loaded");
    Ok(key)
}
