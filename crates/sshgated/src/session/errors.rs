//! Errors raised while servicing one SSH connection.

use thiserror::Error;

/// Failure that ends a connection. Channel-level problems never surface
/// here; they are answered on the channel itself.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport reported a protocol or IO failure.
    #[error("ssh transport error: {0}")]
    Transport(#[from] russh::Error),
}

impl SessionError {
    /// Returns true when the client simply hung up.
    pub(crate) const fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Transport(russh::Error::Disconnect | russh::Error::HUP)
        )
    }
}
