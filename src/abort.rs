//! Cooperative cancellation.
//!
//! An [`AbortSignal`] is a cloneable token threaded through every phase and every
//! dependency call. Nothing is interrupted preemptively: phases poll [`AbortSignal::aborted`]
//! at their documented checkpoints, and dependencies that perform network I/O may await
//! [`AbortSignal::cancelled`] to stop an in-flight request.

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once [`AbortSignal::abort`] has been called on this signal or any clone.
    pub fn aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Resolves when the signal is aborted. This is the listener registration point.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
