use crate::errors::Result;
use crate::traits::Liveness;
use backon::{ConstantBuilder, Retryable};
use log::{info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const COOLDOWN: Duration = Duration::from_secs(120);

/// Guards a `Liveness` resource against concurrent reconnects. `connected`
/// is read on the fast path without the lock; a stale `true` is corrected
/// on the next `mark_disconnected`.
pub struct ConnectionOrchestrator<T: Liveness + ?Sized> {
    resource: Arc<T>,
    connected: AtomicBool,
    reconnecting: Mutex<()>,
    max_retries: u32,
    retry_delay: Duration,
}

impl<T: Liveness + ?Sized> ConnectionOrchestrator<T> {
    pub fn new(resource: Arc<T>, max_retries: u32) -> Self {
        ConnectionOrchestrator {
            resource,
            connected: AtomicBool::new(false),
            reconnecting: Mutex::new(()),
            max_retries,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn resource(&self) -> &Arc<T> {
        &self.resource
    }

    /// Fast path returns immediately if already connected; otherwise only
    /// one caller performs the reconnect loop while the rest block on the
    /// mutex and observe its outcome.
    pub async fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.reconnecting.lock().await;
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.reconnect_loop().await
    }

    /// Probes actual liveness before clearing the flag, defending against a
    /// spurious failure signal raised by a racing caller.
    pub async fn mark_disconnected(&self) {
        if self.resource.is_connected().await {
            trace!("liveness probe reports connected, ignoring disconnect signal");
            return;
        }
        self.connected.store(false, Ordering::Release);
    }

    pub async fn close(&self) -> Result<()> {
        self.resource.close().await
    }

    /// Bounded retries separated by `retry_delay`; on exhaustion sleeps for
    /// a cooldown and starts another round. Expressed as a loop, not
    /// recursion, so the stop flag (via cancellation of the owning task)
    /// can interrupt it at a round boundary.
    async fn reconnect_loop(&self) -> Result<()> {
        loop {
            let builder = ConstantBuilder::default()
                .with_delay(self.retry_delay)
                .with_max_times(self.max_retries as usize);
            let resource = &self.resource;
            let outcome = (|| async { resource.connect().await })
                .retry(builder)
                .notify(|err, dur| warn!("connect failed, retrying in {dur:?}: {err}"))
                .await;
            match outcome {
                Ok(()) => {
                    self.connected.store(true, Ordering::Release);
                    info!("connected");
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        "exhausted {} retries ({err}), cooling down for {:?}",
                        self.max_retries, COOLDOWN
                    );
                    tokio::time::sleep(COOLDOWN).await;
                }
            }
        }
    }
}
