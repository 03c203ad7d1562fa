//! Process Shutdown
//!
//! On SIGTERM or Ctrl+C the API stops taking requests, agents stop their
//! queue workers, and `main` waits a bounded time for deliveries that are
//! already talking to an endpoint.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Stop flag plus a count of deliveries in progress.
///
/// Clones share state. Both values live in watch channels, so a waiter that
/// subscribes after the change still observes it.
#[derive(Clone)]
pub struct ShutdownController {
    stopping: Arc<watch::Sender<bool>>,
    deliveries: Arc<watch::Sender<usize>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            stopping: Arc::new(watch::Sender::new(false)),
            deliveries: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Flag the process as stopping. Repeated calls are ignored.
    pub fn shutdown(&self) {
        let first = self.stopping.send_if_modified(|stopping| !std::mem::replace(stopping, true));
        if first {
            tracing::info!("shutdown requested");
        }
    }

    /// Completes once `shutdown` was called, including before this future
    /// was created. Used as the graceful shutdown of `axum::serve`.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.stopping.subscribe();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }

    pub fn in_flight(&self) -> usize {
        *self.deliveries.borrow()
    }

    /// Count a delivery as in progress while the guard is alive.
    pub fn delivery_guard(&self) -> DeliveryGuard {
        self.deliveries.send_modify(|n| *n += 1);
        DeliveryGuard {
            deliveries: self.deliveries.clone(),
        }
    }

    /// Wait for the in-flight count to reach zero. False on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut rx = self.deliveries.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .is_ok();
        if !drained {
            tracing::warn!("gave up waiting on {} deliveries", self.in_flight());
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one delivery in progress; see `ShutdownController::delivery_guard`.
pub struct DeliveryGuard {
    deliveries: Arc<watch::Sender<usize>>,
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.deliveries.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Resolve on the first SIGTERM or Ctrl+C, then call `shutdown`.
///
/// A signal source that cannot be installed is logged and never fires.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        _ = interrupt => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    tracing::info!("{} received", source);
    controller.shutdown();
}
