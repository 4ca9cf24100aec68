//! Bounded worker pool with a single delivery channel.
//!
//! Every facade operation that may block (a discovery wait, a connect, a
//! USB permission dialog) runs as a Tokio task here, never on the task that
//! reads requests.  At most `max_concurrent` operations run at once; the rest
//! wait for a permit.
//!
//! Completions are funnelled into one `mpsc` channel so a single consumer
//! (the bridge's stdout writer) sees them in completion order.  Each
//! submitted operation produces exactly one [`MethodResponse`]: its own
//! result, or `INTERNAL_ERROR` if the task panicked.

use std::future::Future;
use std::sync::Arc;

use printlink_core::{ErrorCode, MethodResponse, MethodResult};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Default number of operations allowed to run concurrently.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

pub struct WorkerPool {
    permits: Arc<Semaphore>,
    delivery: mpsc::UnboundedSender<MethodResponse>,
}

impl WorkerPool {
    /// Creates a pool and the receiving end of its delivery channel.
    pub fn new(max_concurrent: usize) -> (Self, mpsc::UnboundedReceiver<MethodResponse>) {
        let (delivery, rx) = mpsc::unbounded_channel();
        let pool = Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            delivery,
        };
        (pool, rx)
    }

    /// Runs `work` on a pooled task and delivers its result tagged with `id`.
    pub fn submit<F>(&self, id: u64, work: F) -> JoinHandle<()>
    where
        F: Future<Output = MethodResult> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let delivery = self.delivery.clone();
        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => {
                    debug!(id, "operation started");
                    let joined = tokio::spawn(async move {
                        let _permit = permit;
                        work.await
                    })
                    .await;
                    joined.unwrap_or_else(|e| {
                        error!(id, "operation task failed: {e}");
                        MethodResult::error(
                            ErrorCode::InternalError,
                            "operation failed unexpectedly",
                        )
                    })
                }
                Err(_) => MethodResult::error(ErrorCode::InternalError, "worker pool closed"),
            };
            if delivery.send(MethodResponse::new(id, result)).is_err() {
                debug!(id, "response dropped; delivery channel closed");
            }
        })
    }

    /// Delivers an already-computed result through the same channel.
    pub fn deliver(&self, id: u64, result: MethodResult) {
        if self.delivery.send(MethodResponse::new(id, result)).is_err() {
            debug!(id, "response dropped; delivery channel closed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
