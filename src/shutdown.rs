//! Graceful shutdown coordination using cancellation tokens.
//!
//! The Ctrl+C handler, the HTTP server and the Telegram worker all watch the
//! same controller; triggering it stops accepting requests, lets the worker
//! finish its current command and then disconnects from Telegram.

use tokio_util::sync::CancellationToken;

/// Controller for coordinating graceful shutdown across tasks.
#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Trigger shutdown, notifying all waiting tasks.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when shutdown is triggered. Use in `tokio::select!`.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
