use crate::config::AgentConfig;
use crate::errors::Error;
use crate::pathfile::{file_identity, find_rotation_candidates, PathFile};
use crate::regex_source::RegexSource;
use crate::registries::Registries;
use crate::traits::{Message, Payload, QueryTask, Row};
use crate::transform::TransformAndFilter;
use crate::wdc::{WdcStatus, WorkingDataConnection};
use chrono::Utc;
use log::warn;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

struct ConnectionEntry {
    producer_type: String,
    producer_name: String,
    topic: String,
    name: String,
    is_error: bool,
    is_warning: bool,
    ttl_minutes: Option<i64>,
    database_type: Option<String>,
    database_name: Option<String>,
    query_template: Option<String>,
    source: Option<RegexSource>,
}

/// A completion callback posts here instead of touching the working set
/// directly, so the only writer of `working_set` stays the agent's own
/// worker task.
struct WdcUpdate {
    name: String,
    outcome: Result<Vec<Row>, Error>,
}

/// One configured pipeline: file tailing, regex extraction, WDC lifecycle,
/// scheduled enrichment and dispatch to producers.
pub struct AgentRuntime {
    config: AgentConfig,
    registries: Arc<Registries>,
    transform: Arc<dyn TransformAndFilter>,
    path_files: Mutex<Vec<PathFile>>,
    connections: Vec<ConnectionEntry>,
    path_file_connections: HashMap<String, Vec<usize>>,
    working_set: Mutex<HashMap<String, WorkingDataConnection>>,
    inbox: mpsc::UnboundedSender<WdcUpdate>,
    inbox_rx: Mutex<mpsc::UnboundedReceiver<WdcUpdate>>,
    next_execute_query_time: Mutex<chrono::DateTime<Utc>>,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AgentRuntime {
    pub fn new(
        config: AgentConfig,
        registries: Arc<Registries>,
        transform: Arc<dyn TransformAndFilter>,
    ) -> Result<Arc<Self>, Error> {
        config.validate()?;

        let mut path_files = Vec::with_capacity(config.path_files.len());
        for pf in &config.path_files {
            path_files.push(PathFile::new(
                pf.name.clone(),
                Path::new(&pf.path).to_path_buf(),
                pf.cursor.unwrap_or(0),
            ));
        }

        let mut connections = Vec::new();
        let mut working_set = HashMap::new();
        let now = Utc::now();

        for producer in &config.producer_connections {
            for data_connection in &producer.data_connections {
                let source = match &data_connection.source {
                    Some(src) => Some(
                        RegexSource::compile(src.path_file_name.clone(), &src.pattern).map_err(
                            |err| {
                                Error::Config(crate::config::ConfigError::InvalidPattern {
                                    path_file_name: src.path_file_name.clone(),
                                    source: err,
                                })
                            },
                        )?,
                    ),
                    None => None,
                };

                let entry = ConnectionEntry {
                    producer_type: producer.producer_type.clone(),
                    producer_name: producer.producer_name.clone(),
                    topic: producer.topic.clone(),
                    name: data_connection.name.clone(),
                    is_error: data_connection.is_error,
                    is_warning: data_connection.is_warning,
                    ttl_minutes: data_connection.ttl_minutes.map(|m| m as i64),
                    database_type: data_connection
                        .destination
                        .as_ref()
                        .map(|d| d.database_type.clone()),
                    database_name: data_connection
                        .destination
                        .as_ref()
                        .map(|d| d.database_name.clone()),
                    query_template: data_connection
                        .destination
                        .as_ref()
                        .map(|d| d.query_template.clone()),
                    source,
                };

                working_set.insert(
                    entry.name.clone(),
                    WorkingDataConnection::new(
                        entry.name.clone(),
                        entry.producer_type.clone(),
                        entry.producer_name.clone(),
                        entry.topic.clone(),
                        entry.database_type.clone(),
                        entry.database_name.clone(),
                        entry.query_template.clone(),
                        entry.is_error,
                        entry.is_warning,
                        entry.ttl_minutes,
                        HashMap::new(),
                        now,
                    ),
                );

                connections.push(entry);
            }
        }

        let mut path_file_connections: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in connections.iter().enumerate() {
            if let Some(source) = &entry.source {
                path_file_connections
                    .entry(source.path_file_name.clone())
                    .or_default()
                    .push(idx);
            }
        }

        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(AgentRuntime {
            next_execute_query_time: Mutex::new(now + chrono::Duration::seconds(
                config.execute_query_interval as i64,
            )),
            config,
            registries,
            transform,
            path_files: Mutex::new(path_files),
            connections,
            path_file_connections,
            working_set: Mutex::new(working_set),
            inbox,
            inbox_rx: Mutex::new(inbox_rx),
            stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }))
    }

    pub async fn start(self: &Arc<Self>) {
        let me = self.clone();
        let handle = tokio::spawn(async move { me.run().await });
        *self.handle.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn run(self: Arc<Self>) {
        let interval = std::time::Duration::from_secs(self.config.fetch_logs_interval);
        while !self.stop.load(Ordering::Acquire) {
            if let Err(err) = self.tick().await {
                warn!("agent {} tick failed: {err}", self.config.name);
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn tick(&self) -> Result<(), Error> {
        let mut path_files = self.path_files.lock().await;
        for idx in 0..path_files.len() {
            let lines = self.read_path_file(path_files.as_mut_slice(), idx).await;
            let name = path_files[idx].name.clone();
            for line in &lines {
                self.feed_line(&name, line).await;
                // Dispatch right away: a line that flips a WDC to `Updated`
                // must be observed by dispatch_pass() before a later line in
                // the same batch compares against it and overwrites it back
                // to `Ready`, or the intermediate update is lost.
                self.dispatch_pass().await;
            }
        }
        drop(path_files);

        self.drain_inbox().await;

        let now = Utc::now();
        let mut next = self.next_execute_query_time.lock().await;
        if now >= *next {
            self.enrichment_pass().await;
            *next = now + chrono::Duration::seconds(self.config.execute_query_interval as i64);
        }
        drop(next);

        self.dispatch_pass().await;
        self.eviction_pass().await;
        Ok(())
    }

    async fn read_path_file(&self, path_files: &mut [PathFile], idx: usize) -> Vec<String> {
        let current_id = match file_identity(&path_files[idx].path).await {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    "could not stat path file {}: {err}",
                    path_files[idx].name
                );
                return Vec::new();
            }
        };

        let stored_id = path_files[idx].file_id;
        match stored_id {
            None => {
                path_files[idx].file_id = Some(current_id);
                path_files[idx].read_batch(self.config.buffer_rows).await.unwrap_or_default()
            }
            Some(stored) if stored != current_id => {
                let mut lines = Vec::new();
                let dir = path_files[idx]
                    .path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                let prefix = path_files[idx]
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default()
                    .to_string();
                match find_rotation_candidates(&dir, &prefix, &path_files[idx].path).await {
                    Ok(candidates) => {
                        let mut found = false;
                        for candidate in candidates.iter().rev() {
                            if let Ok(candidate_id) = file_identity(candidate).await {
                                if candidate_id == stored {
                                    if let Ok(remainder) =
                                        path_files[idx].read_remainder(candidate).await
                                    {
                                        lines = remainder;
                                    }
                                    found = true;
                                    break;
                                }
                            }
                        }
                        if !found {
                            warn!(
                                "rotation detected for {} but no predecessor file found, data may be lost",
                                path_files[idx].name
                            );
                        }
                    }
                    Err(err) => warn!("could not enumerate rotation candidates: {err}"),
                }
                path_files[idx].cursor = 0;
                path_files[idx].file_id = Some(current_id);
                lines
            }
            Some(_) => path_files[idx]
                .read_batch(self.config.buffer_rows)
                .await
                .unwrap_or_default(),
        }
    }

    /// Processes one line: every connection reading from `path_file_name`
    /// gets a chance to match it and update its WDC. Called once per line
    /// so the caller can dispatch in between, rather than batching every
    /// line in a read before anything is dispatched.
    async fn feed_line(&self, path_file_name: &str, line: &str) {
        let Some(indices) = self.path_file_connections.get(path_file_name) else {
            return;
        };

        let now = Utc::now();
        let mut working_set = self.working_set.lock().await;
        for &idx in indices {
            let entry = &self.connections[idx];
            let Some(source) = &entry.source else {
                continue;
            };
            let Some(match_dict) = source.match_line(line) else {
                continue;
            };

            let tmp = self.transform.transform(&match_dict);

            let mut wdc = WorkingDataConnection::new(
                entry.name.clone(),
                entry.producer_type.clone(),
                entry.producer_name.clone(),
                entry.topic.clone(),
                entry.database_type.clone(),
                entry.database_name.clone(),
                entry.query_template.clone(),
                entry.is_error,
                entry.is_warning,
                entry.ttl_minutes,
                match_dict,
                now,
            );

            if entry.query_template.is_some() {
                wdc.query_source_dict = tmp;
                wdc.status = WdcStatus::Ready;
            } else {
                let new_row: Row = tmp.into_iter().collect();
                let previous = working_set.get(&entry.name).map(|w| w.result_dict.clone());
                if previous.as_ref() != Some(&new_row) {
                    wdc.result_dict = new_row;
                    wdc.status = WdcStatus::Updated;
                } else {
                    wdc.result_dict = new_row;
                    wdc.status = WdcStatus::Ready;
                }
            }

            working_set.insert(entry.name.clone(), wdc);
        }
    }

    async fn drain_inbox(&self) {
        let mut rx = self.inbox_rx.lock().await;
        let mut working_set = self.working_set.lock().await;
        while let Ok(update) = rx.try_recv() {
            let Some(wdc) = working_set.get_mut(&update.name) else {
                continue;
            };
            match update.outcome {
                Ok(rows) => {
                    if rows != wdc.result_list {
                        wdc.result_list = rows;
                        wdc.status = WdcStatus::Updated;
                    } else {
                        wdc.status = WdcStatus::Ready;
                    }
                }
                Err(err) => {
                    warn!("enrichment query for {} failed: {err}", update.name);
                    wdc.update_expired_time(0, Utc::now());
                }
            }
        }
    }

    async fn enrichment_pass(&self) {
        let ready_queries: Vec<(String, String, String, String, HashMap<String, String>)> = {
            let mut working_set = self.working_set.lock().await;
            let mut out = Vec::new();
            for wdc in working_set.values_mut() {
                if wdc.status != WdcStatus::Ready || !wdc.has_database_binding() {
                    continue;
                }
                out.push((
                    wdc.name.clone(),
                    wdc.database_type.clone().unwrap(),
                    wdc.database_name.clone().unwrap(),
                    wdc.query_template.clone().unwrap(),
                    wdc.query_source_dict.clone(),
                ));
                wdc.status = WdcStatus::QueryRunning;
            }
            out
        };

        for (name, database_type, database_name, template, params) in ready_queries {
            let executor = match self.registries.get_database(&database_type, &database_name).await
            {
                Ok(executor) => executor,
                Err(err) => {
                    warn!("could not resolve database {database_name}: {err}");
                    let mut working_set = self.working_set.lock().await;
                    if let Some(wdc) = working_set.get_mut(&name) {
                        wdc.status = WdcStatus::Ready;
                    }
                    continue;
                }
            };

            let receiver = match executor.enqueue_query(QueryTask { template, params }).await {
                Ok(receiver) => receiver,
                Err(err) => {
                    warn!("could not submit enrichment query for {name}: {err}");
                    let mut working_set = self.working_set.lock().await;
                    if let Some(wdc) = working_set.get_mut(&name) {
                        wdc.status = WdcStatus::Ready;
                    }
                    continue;
                }
            };

            let inbox = self.inbox.clone();
            tokio::spawn(async move {
                let outcome = match receiver.await {
                    Ok(result) => result,
                    Err(_) => Err(Error::UnexpectedState(
                        "enrichment query result channel dropped".into(),
                    )),
                };
                let _ = inbox.send(WdcUpdate { name, outcome });
            });
        }
    }

    async fn dispatch_pass(&self) {
        let due: Vec<(String, String, String, String, bool, bool, Option<i64>, Message)> = {
            let working_set = self.working_set.lock().await;
            working_set
                .values()
                .filter(|wdc| wdc.status == WdcStatus::Updated)
                .map(|wdc| {
                    let payload = if wdc.query_template.is_some() {
                        Payload::Many(wdc.result_list.clone())
                    } else {
                        Payload::Single(wdc.result_dict.clone())
                    };
                    (
                        wdc.name.clone(),
                        wdc.producer_type.clone(),
                        wdc.producer_name.clone(),
                        wdc.topic.clone(),
                        wdc.is_error,
                        wdc.is_warning,
                        wdc.ttl_minutes,
                        Message {
                            topic: wdc.topic.clone(),
                            is_error: wdc.is_error,
                            is_warning: wdc.is_warning,
                            payload,
                        },
                    )
                })
                .collect()
        };

        for (name, producer_type, producer_name, topic, _is_error, _is_warning, ttl_minutes, message) in due {
            let executor = match self
                .registries
                .get_producer(&producer_type, &producer_name, &topic)
                .await
            {
                Ok(executor) => executor,
                Err(err) => {
                    warn!("could not resolve producer {producer_name}: {err}");
                    self.force_expire(&name).await;
                    continue;
                }
            };

            match executor.enqueue(message).await {
                Ok(()) => {
                    let mut working_set = self.working_set.lock().await;
                    if let Some(wdc) = working_set.get_mut(&name) {
                        if let Some(m) = ttl_minutes {
                            wdc.update_expired_time(m, Utc::now());
                        }
                        wdc.status = WdcStatus::Ready;
                    }
                }
                Err(err) => {
                    warn!("could not enqueue message for {name}: {err}");
                    self.force_expire(&name).await;
                }
            }
        }
    }

    async fn force_expire(&self, name: &str) {
        let mut working_set = self.working_set.lock().await;
        if let Some(wdc) = working_set.get_mut(name) {
            wdc.force_expire();
        }
    }

    async fn eviction_pass(&self) {
        let mut working_set = self.working_set.lock().await;
        working_set.retain(|_, wdc| wdc.status != WdcStatus::Expired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AgentConfig, BaseDatabaseConfig, BaseProducerConfig, DataConnectionConfig, DbEndpoint,
        PathFileConfig, ProducerConnectionConfig, QueryRefConfig, RegexSourceConfig,
    };
    use crate::registries::{DatabaseFactory, ProducerFactory};
    use crate::testing::{RecordingDatabase, RecordingProducer};
    use crate::traits::{Database, Producer};
    use std::collections::HashMap as StdHashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    fn registries_with_producer() -> Arc<Registries> {
        let producers = vec![crate::config::BaseProducerConfig {
            producer_type: "kafka".into(),
            name: "demo".into(),
            topics: None,
            max_retries: 3,
        }];
        let mut producer_factories: StdHashMap<String, ProducerFactory> = StdHashMap::new();
        producer_factories.insert(
            "kafka".into(),
            Arc::new(|_: &crate::config::BaseProducerConfig| {
                Ok(Arc::new(RecordingProducer::succeeding()) as Arc<dyn Producer>)
            }),
        );
        let database_factories: StdHashMap<String, DatabaseFactory> = StdHashMap::new();
        Arc::new(Registries::new(
            Vec::new(),
            producers,
            database_factories,
            producer_factories,
        ))
    }

    #[tokio::test]
    async fn extract_and_dispatch_without_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, b"").unwrap();

        let config = AgentConfig {
            agent_type: "demo".into(),
            name: "a1".into(),
            buffer_rows: 500,
            path_files: vec![PathFileConfig {
                name: "app".into(),
                path: path.display().to_string(),
                cursor: None,
            }],
            producer_connections: vec![ProducerConnectionConfig {
                producer_type: "kafka".into(),
                producer_name: "demo".into(),
                topic: "errors".into(),
                data_connections: vec![DataConnectionConfig {
                    name: "err".into(),
                    is_error: true,
                    is_warning: false,
                    source: Some(RegexSourceConfig {
                        path_file_name: "app".into(),
                        pattern: r"^ERR (?P<code>\d+) (?P<msg>.+)$".into(),
                    }),
                    destination: None,
                    ttl_minutes: None,
                }],
            }],
            fetch_logs_interval: 120,
            execute_query_interval: 600,
        };

        let registries = registries_with_producer();
        let agent = AgentRuntime::new(config, registries, Arc::new(crate::transform::Identity))
            .unwrap();

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "ERR 42 boom").unwrap();
        }

        agent.tick().await.unwrap();

        let working_set = agent.working_set.lock().await;
        let wdc = working_set.get("err").unwrap();
        assert_eq!(wdc.status, WdcStatus::Ready);
        assert_eq!(wdc.result_dict.get("code").map(String::as_str), Some("42"));
    }

    /// A duplicate line sandwiched between two distinct ones must not erase
    /// the first line's pending update before it is dispatched: exactly two
    /// messages go out, one per distinct value.
    #[tokio::test]
    async fn duplicate_line_does_not_erase_pending_update_before_dispatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, b"").unwrap();

        let config = AgentConfig {
            agent_type: "demo".into(),
            name: "a1".into(),
            buffer_rows: 500,
            path_files: vec![PathFileConfig {
                name: "app".into(),
                path: path.display().to_string(),
                cursor: None,
            }],
            producer_connections: vec![ProducerConnectionConfig {
                producer_type: "kafka".into(),
                producer_name: "demo".into(),
                topic: "errors".into(),
                data_connections: vec![DataConnectionConfig {
                    name: "err".into(),
                    is_error: true,
                    is_warning: false,
                    source: Some(RegexSourceConfig {
                        path_file_name: "app".into(),
                        pattern: r"^ERR (?P<code>\d+) (?P<msg>.+)$".into(),
                    }),
                    destination: None,
                    ttl_minutes: None,
                }],
            }],
            fetch_logs_interval: 120,
            execute_query_interval: 600,
        };

        let producer = Arc::new(RecordingProducer::succeeding());
        let producer_for_factory = producer.clone();
        let producers = vec![BaseProducerConfig {
            producer_type: "kafka".into(),
            name: "demo".into(),
            topics: None,
            max_retries: 3,
        }];
        let mut producer_factories: StdHashMap<String, ProducerFactory> = StdHashMap::new();
        producer_factories.insert(
            "kafka".into(),
            Arc::new(move |_: &BaseProducerConfig| {
                Ok(producer_for_factory.clone() as Arc<dyn Producer>)
            }),
        );
        let database_factories: StdHashMap<String, DatabaseFactory> = StdHashMap::new();
        let registries = Arc::new(Registries::new(
            Vec::new(),
            producers,
            database_factories,
            producer_factories,
        ));

        let agent = AgentRuntime::new(config, registries, Arc::new(crate::transform::Identity))
            .unwrap();

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "ERR 42 boom").unwrap();
            writeln!(f, "ERR 42 boom").unwrap();
            writeln!(f, "ERR 43 zap").unwrap();
        }

        agent.tick().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(producer.sent_count(), 2);
    }

    /// End-to-end enrichment: a regex match with a database binding runs a
    /// query, the result flows back through the inbox, and the dispatch
    /// pass delivers it to the producer.
    #[tokio::test]
    async fn enrichment_pass_runs_query_and_dispatches_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, b"").unwrap();

        let config = AgentConfig {
            agent_type: "demo".into(),
            name: "a1".into(),
            buffer_rows: 500,
            path_files: vec![PathFileConfig {
                name: "app".into(),
                path: path.display().to_string(),
                cursor: None,
            }],
            producer_connections: vec![ProducerConnectionConfig {
                producer_type: "kafka".into(),
                producer_name: "demo".into(),
                topic: "errors".into(),
                data_connections: vec![DataConnectionConfig {
                    name: "lookup".into(),
                    is_error: true,
                    is_warning: false,
                    source: Some(RegexSourceConfig {
                        path_file_name: "app".into(),
                        pattern: r"^ERR (?P<code>\d+)$".into(),
                    }),
                    destination: Some(QueryRefConfig {
                        database_type: "oracle".into(),
                        database_name: "orders".into(),
                        query_template: "SELECT * FROM orders WHERE code = :code".into(),
                    }),
                    ttl_minutes: None,
                }],
            }],
            fetch_logs_interval: 120,
            execute_query_interval: 600,
        };

        let producer = Arc::new(RecordingProducer::succeeding());
        let producer_for_factory = producer.clone();
        let producers = vec![BaseProducerConfig {
            producer_type: "kafka".into(),
            name: "demo".into(),
            topics: None,
            max_retries: 3,
        }];
        let mut producer_factories: StdHashMap<String, ProducerFactory> = StdHashMap::new();
        producer_factories.insert(
            "kafka".into(),
            Arc::new(move |_: &BaseProducerConfig| {
                Ok(producer_for_factory.clone() as Arc<dyn Producer>)
            }),
        );

        let databases = vec![BaseDatabaseConfig {
            db_type: "oracle".into(),
            name: "orders".into(),
            username: "u".into(),
            password: "p".into(),
            primary: DbEndpoint {
                host: "localhost".into(),
                port: 1521,
                service_name: None,
            },
            replica: None,
            max_retries: 3,
            max_workers: 2,
        }];
        let mut database_factories: StdHashMap<String, DatabaseFactory> = StdHashMap::new();
        database_factories.insert(
            "oracle".into(),
            Arc::new(|_: &BaseDatabaseConfig| {
                Ok(Arc::new(RecordingDatabase::succeeding()) as Arc<dyn Database>)
            }),
        );

        let registries = Arc::new(Registries::new(
            databases,
            producers,
            database_factories,
            producer_factories,
        ));
        let agent = AgentRuntime::new(config, registries, Arc::new(crate::transform::Identity))
            .unwrap();

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "ERR 42").unwrap();
        }

        agent.tick().await.unwrap();
        {
            let working_set = agent.working_set.lock().await;
            let wdc = working_set.get("lookup").unwrap();
            assert_eq!(wdc.status, WdcStatus::Ready);
            assert_eq!(wdc.query_source_dict.get("code").map(String::as_str), Some("42"));
        }

        agent.enrichment_pass().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        agent.drain_inbox().await;
        agent.dispatch_pass().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        {
            let working_set = agent.working_set.lock().await;
            let wdc = working_set.get("lookup").unwrap();
            assert_eq!(wdc.status, WdcStatus::Ready);
        }
        assert_eq!(producer.sent_count(), 1);
    }
}
