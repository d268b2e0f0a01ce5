use super::QUEUE_POLL;
use crate::errors::Error;
use crate::orchestrator::ConnectionOrchestrator;
use crate::retry::{backoff_delay, Task};
use crate::traits::{Message, Producer};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Queues outgoing messages for a shared producer connection and sends
/// them in order from a single dispatcher/worker, retrying transient
/// failures with exponential-plus-jitter backoff. Duplicates may be
/// observed across retries; delivery is at-least-once, not exactly-once.
pub struct ProducerExecutor {
    sender: mpsc::Sender<Task<Message>>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    orchestrator: Arc<ConnectionOrchestrator<dyn Producer>>,
}

impl ProducerExecutor {
    pub fn start(producer: Arc<dyn Producer>, max_retries: u32) -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        let stop = Arc::new(AtomicBool::new(false));
        let orchestrator = Arc::new(ConnectionOrchestrator::new(producer.clone(), max_retries));

        let worker = tokio::spawn(worker_loop(
            receiver,
            sender.clone(),
            stop.clone(),
            orchestrator.clone(),
            producer,
            max_retries,
        ));

        ProducerExecutor {
            sender,
            stop,
            worker: Mutex::new(Some(worker)),
            orchestrator,
        }
    }

    pub async fn enqueue(&self, message: Message) -> Result<(), Error> {
        self.sender
            .send(Task::new(message))
            .await
            .map_err(|_| Error::UnexpectedState("producer executor has stopped".into()))
    }

    pub async fn stop(&self, timeout: std::time::Duration) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.lock().await.take() {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("producer executor did not drain within {timeout:?}");
            }
        }
        if let Err(err) = self.orchestrator.close().await {
            error!("error closing producer connection: {err}");
        }
    }
}

async fn worker_loop(
    mut receiver: mpsc::Receiver<Task<Message>>,
    requeue: mpsc::Sender<Task<Message>>,
    stop: Arc<AtomicBool>,
    orchestrator: Arc<ConnectionOrchestrator<dyn Producer>>,
    producer: Arc<dyn Producer>,
    max_retries: u32,
) {
    loop {
        if let Err(err) = orchestrator.ensure_connected().await {
            error!("producer connect failed: {err}");
        }

        let next = tokio::time::timeout(QUEUE_POLL, receiver.recv()).await;
        let task = match next {
            Ok(Some(task)) => task,
            Ok(None) => break,
            Err(_elapsed) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                continue;
            }
        };

        match producer.send(&task.payload).await {
            Ok(()) => {
                info!("message delivered to topic {}", task.payload.topic);
            }
            Err(err) => {
                orchestrator.mark_disconnected().await;
                if task.exhausted(max_retries) {
                    // The reference worker terminates on exhaustion rather than
                    // dropping the message silently; callers must restart the
                    // executor to resume delivery.
                    error!("message to {} exhausted retries: {err}", task.payload.topic);
                    break;
                }
                let delay = backoff_delay(task.retries);
                let bumped = task.bumped();
                let requeue = requeue.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = requeue.send(bumped).await;
                });
            }
        }
    }
}
