use super::QUEUE_POLL;
use crate::errors::Error;
use crate::orchestrator::ConnectionOrchestrator;
use crate::retry::{backoff_delay, Task};
use crate::traits::{Database, QueryTask, Row};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;

struct QueryJob {
    query: QueryTask,
    responder: oneshot::Sender<Result<Vec<Row>, Error>>,
}

/// Queues enriched queries for a shared database connection and runs them
/// across a bounded worker pool, retrying transient failures with
/// exponential-plus-jitter backoff.
pub struct DatabaseExecutor {
    sender: mpsc::Sender<Task<QueryJob>>,
    stop: Arc<AtomicBool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    orchestrator: Arc<ConnectionOrchestrator<dyn Database>>,
}

impl DatabaseExecutor {
    pub fn start(database: Arc<dyn Database>, max_retries: u32, max_workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        let stop = Arc::new(AtomicBool::new(false));
        let orchestrator = Arc::new(ConnectionOrchestrator::new(database.clone(), max_retries));
        let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));

        let dispatcher = tokio::spawn(dispatch(
            receiver,
            sender.clone(),
            stop.clone(),
            orchestrator.clone(),
            database,
            semaphore,
            max_retries,
        ));

        DatabaseExecutor {
            sender,
            stop,
            dispatcher: Mutex::new(Some(dispatcher)),
            orchestrator,
        }
    }

    /// Returns a future resolving with the query's result once a worker
    /// completes it (or its retries are exhausted).
    pub async fn enqueue_query(
        &self,
        query: QueryTask,
    ) -> Result<oneshot::Receiver<Result<Vec<Row>, Error>>, Error> {
        let (responder, receiver) = oneshot::channel();
        let task = Task::new(QueryJob { query, responder });
        self.sender
            .send(task)
            .await
            .map_err(|_| Error::UnexpectedState("database executor has stopped".into()))?;
        Ok(receiver)
    }

    pub async fn stop(&self, timeout: std::time::Duration) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.dispatcher.lock().await.take() {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!("database executor did not drain within {timeout:?}");
            }
        }
        if let Err(err) = self.orchestrator.close().await {
            error!("error closing database connection: {err}");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    mut receiver: mpsc::Receiver<Task<QueryJob>>,
    requeue: mpsc::Sender<Task<QueryJob>>,
    stop: Arc<AtomicBool>,
    orchestrator: Arc<ConnectionOrchestrator<dyn Database>>,
    database: Arc<dyn Database>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
) {
    if let Err(err) = orchestrator.ensure_connected().await {
        error!("initial database connect failed: {err}");
    }

    loop {
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

        if let Err(err) = orchestrator.ensure_connected().await {
            error!("database reconnect failed: {err}");
        }

        let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
        let database = database.clone();
        let orchestrator = orchestrator.clone();
        let requeue = requeue.clone();
        tokio::spawn(async move {
            let _permit = permit;
            run(task, database, orchestrator, requeue, max_retries).await;
        });
    }
}

async fn run(
    task: Task<QueryJob>,
    database: Arc<dyn Database>,
    orchestrator: Arc<ConnectionOrchestrator<dyn Database>>,
    requeue: mpsc::Sender<Task<QueryJob>>,
    max_retries: u32,
) {
    let Task { payload, retries } = task;
    match database.execute(&payload.query).await {
        Ok(rows) => {
            info!("query completed after {retries} retr{}", if retries == 1 { "y" } else { "ies" });
            let _ = payload.responder.send(Ok(rows));
        }
        Err(err) => {
            orchestrator.mark_disconnected().await;
            let task = Task {
                payload,
                retries,
            };
            if task.exhausted(max_retries) {
                warn!("query exhausted {max_retries} retries: {err}");
                let _ = task.payload.responder.send(Err(Error::RetriesExhausted {
                    database: task.payload.query.template.clone(),
                    detail: err.to_string(),
                }));
                return;
            }
            let delay = backoff_delay(task.retries);
            let bumped = task.bumped();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = requeue.send(bumped).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDatabase;
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test]
    async fn successful_query_resolves_future() {
        let database = Arc::new(RecordingDatabase::succeeding());
        let executor = DatabaseExecutor::start(database, 3, 2);
        let receiver = executor
            .enqueue_query(QueryTask {
                template: "SELECT 1".into(),
                params: HashMap::new(),
            })
            .await
            .unwrap();
        let result = receiver.await.unwrap();
        assert!(result.is_ok());
        executor.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn persistent_failure_surfaces_after_max_retries() {
        let database = Arc::new(RecordingDatabase::always_failing());
        let executor = DatabaseExecutor::start(database, 1, 1);
        let receiver = executor
            .enqueue_query(QueryTask {
                template: "SELECT 1".into(),
                params: HashMap::new(),
            })
            .await
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(15), receiver)
            .await
            .expect("should resolve")
            .unwrap();
        assert!(matches!(result, Err(Error::RetriesExhausted { .. })));
        executor.stop(Duration::from_secs(1)).await;
    }
}
