use tokio_util::sync::CancellationToken;

/// Single-fire shutdown notification for one serve call.
///
/// Clones share the same notification. Triggering more than once has no
/// further effect.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// Creates an untriggered handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the serve loop to stop.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns true once [`ShutdownHandle::trigger`] has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the handle is triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}
