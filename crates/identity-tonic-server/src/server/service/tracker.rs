//! In-flight call accounting and graceful drain.
//!
//! [`CallTracker`] counts the `UserInfo` calls currently being served and
//! refuses new ones once shutdown has begun. Shutdown is cooperative: the
//! shared [`CancellationToken`] is cancelled first so no call can enter, then
//! the tracker waits (bounded) for the in-flight count to reach zero.

use crate::server::telemetry::{decrement_calls_inflight, increment_calls_inflight};
use core::time::Duration;
use identity_tonic_core::Error;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct CallTracker {
    inflight: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Registers a new call. The returned guard deregisters it on drop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn enter(self: &Arc<Self>) -> Result<CallGuard, Error> {
        // Count first, then check: a call either sees the cancellation or is
        // seen by the drain loop.
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.shutdown_token.is_cancelled() {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::ServiceShutdown);
        }
        increment_calls_inflight();
        Ok(CallGuard(Arc::clone(self)))
    }

    /// Stops accepting calls and waits up to `drain_timeout` for in-flight
    /// calls to finish. Returns the number of calls still running.
    pub async fn shutdown(&self, drain_timeout: Duration) -> usize {
        // === Phase 0: Stop accepting new calls ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new calls");
        self.shutdown_token.cancel();

        // === Phase 1: Wait for in-flight calls to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        let drain_result = timeout(drain_timeout, async {
            while self.inflight() > 0 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight calls drained successfully");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} calls still active)",
                    self.inflight()
                );
            }
        }

        self.inflight()
    }
}

/// Marks one call as in flight for as long as it lives.
#[derive(Debug)]
pub struct CallGuard(Arc<CallTracker>);

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.0.inflight.fetch_sub(1, Ordering::SeqCst);
        decrement_calls_inflight();
    }
}
