//! Shutdown coordination.

use tokio_util::sync::CancellationToken;

/// Root cancellation scope for the process.
///
/// Long-running tasks take a child token; triggering the shutdown cancels
/// every child.
#[derive(Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token, used as the parent of health check scopes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
