//! Graceful shutdown coordination.
//!
//! One `CancellationToken` fans out to every server task; a `TaskTracker`
//! follows the connection sessions so a shutdown can wait for them to
//! drain instead of abandoning them mid-write.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before abandoning sessions.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across all server tasks.
///
/// Connection sessions take child tokens of this coordinator's token and
/// run as tracked futures, so one `shutdown()` reaches every open
/// connection (write loops send Close frames, stream handlers observe
/// cancellation, the accept loop stops) and [`graceful_shutdown`] can
/// wait for the sessions to finish tearing down.
///
/// [`graceful_shutdown`]: ShutdownCoordinator::graceful_shutdown
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Get a handle to the session tracker. Wrap each session future in
    /// [`TaskTracker::track_future`] before spawning it.
    pub fn tracker(&self) -> TaskTracker {
        self.sessions.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token and wait up to `timeout` for tracked sessions to
    /// drain. Sessions still running at the deadline are left to the
    /// runtime.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        self.sessions.close();
        info!(
            session_count = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for sessions to drain"
        );

        if tokio::time::timeout(timeout, self.sessions.wait())
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}, some sessions may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_sets_flag_and_is_idempotent() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn child_tokens_observe_shutdown() {
        let coord = ShutdownCoordinator::new();
        let child = coord.token().child_token();
        assert!(!child.is_cancelled());
        coord.shutdown();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tracked_sessions() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let tracker = coord.tracker();

        let session = tokio::spawn(tracker.track_future(async move {
            token.cancelled().await;
        }));

        coord.graceful_shutdown(None).await;
        assert!(coord.is_shutting_down());
        // the session observed cancellation and finished
        session.await.unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out_on_stuck_session() {
        let coord = ShutdownCoordinator::new();
        let tracker = coord.tracker();

        // A session that ignores cancellation
        let stuck = tokio::spawn(tracker.track_future(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        coord
            .graceful_shutdown(Some(Duration::from_millis(100)))
            .await;
        assert!(coord.is_shutting_down());
        stuck.abort();
    }

    #[tokio::test]
    async fn graceful_shutdown_with_no_sessions_returns_immediately() {
        let coord = ShutdownCoordinator::new();
        tokio::time::timeout(Duration::from_secs(1), coord.graceful_shutdown(None))
            .await
            .unwrap();
    }
}
