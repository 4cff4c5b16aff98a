//! Call admission and graceful shutdown.
//!
//! [`ServiceState`] is the only state shared between calls, and none of it
//! influences a computed result: it holds the immutable [`ServerConfig`], a
//! drain flag, the number of calls in flight and the [`CancellationToken`]
//! that stops streaming producers when the service terminates.
//!
//! Every handler calls [`ServiceState::admit`] first. The returned
//! [`CallGuard`] is held for the lifetime of the call (streaming producers
//! move it into their task), so the in-flight count covers streams that
//! outlive their handler.

use crate::server::{
    config::ServerConfig,
    telemetry::{add_calls_inflight, increment_errors, increment_requests, record_call_duration},
};
use abacus_tonic_core::{Error, abacus::Operation};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::{sync::Arc, time::Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// How long producers get to observe cancellation before shutdown gives up
/// on them.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct ServiceState {
    config: ServerConfig,
    shutdown_token: CancellationToken,
    draining: AtomicBool,
    inflight: AtomicUsize,
}

impl ServiceState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown_token: CancellationToken::new(),
            draining: AtomicBool::new(false),
            inflight: AtomicUsize::new(0),
        }
    }

    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Token cancelled once the drain phase of [`ServiceState::shutdown`]
    /// has elapsed.
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    pub fn calls_inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Registers a new call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn admit(self: &Arc<Self>, operation: Operation) -> Result<CallGuard, Error> {
        // Count first, then check: shutdown sets the flag before it reads the
        // count, so a call that sees `draining == false` is always counted.
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if self.draining.load(Ordering::SeqCst) {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            increment_errors(operation);
            tracing::debug!(%operation, "Refusing call during shutdown");
            return Err(Error::ServiceShutdown);
        }

        increment_requests(operation);
        add_calls_inflight(1);

        Ok(CallGuard {
            state: Arc::clone(self),
            operation,
            started: Instant::now(),
        })
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new calls.
    /// - Waits up to `shutdown_timeout` for in-flight calls to finish.
    /// - Cancels the shared [`CancellationToken`] so remaining streams stop.
    /// - Waits briefly for the cancelled producers to release their calls.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new calls ===
        tracing::info!("Refusing new calls");
        self.draining.store(true, Ordering::SeqCst);

        // === Phase 1: Wait for in-flight calls to drain ===
        tracing::info!(
            "Draining in-flight calls ({} active)",
            self.calls_inflight()
        );
        if self.wait_idle(self.config.shutdown_timeout).await {
            tracing::debug!("All in-flight calls drained");
        } else {
            tracing::warn!(
                "Graceful drain timed out ({} calls still active)",
                self.calls_inflight()
            );
        }

        // === Phase 2: Cancel whatever is left ===
        tracing::debug!("Cancelling remaining streams via shutdown token");
        self.shutdown_token.cancel();

        if !self.wait_idle(CANCEL_GRACE).await {
            tracing::warn!(
                "{} calls did not observe cancellation",
                self.calls_inflight()
            );
        }

        tracing::info!("Service shutdown complete");
    }

    /// Returns `true` if no call was in flight before `limit` elapsed.
    async fn wait_idle(&self, limit: Duration) -> bool {
        timeout(limit, async {
            while self.calls_inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}

/// Keeps a call registered with its [`ServiceState`] until dropped.
#[derive(Debug)]
pub struct CallGuard {
    state: Arc<ServiceState>,
    operation: Operation,
    started: Instant,
}

impl CallGuard {
    pub const fn operation(&self) -> Operation {
        self.operation
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.state.inflight.fetch_sub(1, Ordering::AcqRel);
        add_calls_inflight(-1);
        record_call_duration(
            self.operation,
            self.started.elapsed().as_secs_f64() * 1000.0,
        );
    }
}
