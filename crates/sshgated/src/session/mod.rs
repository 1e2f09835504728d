//! SSH connection handling.
//!
//! ## Channel policy
//!
//! - Only `session` channels are accepted.
//! - `env` requests are recorded on their channel until the exec starts.
//! - The first `exec` on a channel is dispatched. Success writes the output
//!   to the data stream; failure writes `error: <message>` to stderr. Either
//!   way the exit status follows, then EOF, then the channel is closed.
//! - A further `exec` on the same channel is answered with a channel
//!   failure. Clients retry on a new channel of the same connection.
//! - `shell`, `pty-req` and `subsystem` requests are refused; the channel
//!   stays open.

mod auth;
mod errors;
mod handler;

use std::time::Duration;

use russh::server::Config;
use russh_keys::key::KeyPair;

pub use self::auth::{AuthPolicy, AuthPolicyError, Identity};
pub use self::errors::SessionError;
pub use self::handler::SessionHandler;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Builds the russh server configuration for `host_key` and `auth`.
#[must_use]
pub fn server_config(host_key: KeyPair, auth: &AuthPolicy, inactivity_timeout: Duration) -> Config {
    Config {
        methods: auth.methods(),
        keys: vec![host_key],
        inactivity_timeout: Some(inactivity_timeout),
        auth_rejection_time: Duration::from_millis(250),
        auth_rejection_time_initial: Some(Duration::ZERO),
        ..Config::default()
    }
}
