use crate::config::{BaseDatabaseConfig, BaseProducerConfig};
use crate::errors::Error;
use crate::executor::{DatabaseExecutor, ProducerExecutor};
use crate::registry::SharedResourceRegistry;
use crate::traits::{Database, Producer};
use std::collections::HashMap;
use std::sync::Arc;

pub type DatabaseFactory =
    Arc<dyn Fn(&BaseDatabaseConfig) -> Result<Arc<dyn Database>, Error> + Send + Sync>;
pub type ProducerFactory =
    Arc<dyn Fn(&BaseProducerConfig) -> Result<Arc<dyn Producer>, Error> + Send + Sync>;

/// Type→(config, constructor) lookup plus the keyed-singleton caches that
/// back it. One instance is built once at process start (in the `cli`
/// bootstrap) and shared by every agent.
pub struct Registries {
    database_configs: HashMap<(String, String), BaseDatabaseConfig>,
    producer_configs: HashMap<(String, String), BaseProducerConfig>,
    database_factories: HashMap<String, DatabaseFactory>,
    producer_factories: HashMap<String, ProducerFactory>,
    database_instances: SharedResourceRegistry<DatabaseExecutor>,
    producer_instances: SharedResourceRegistry<ProducerExecutor>,
}

impl Registries {
    pub fn new(
        databases: Vec<BaseDatabaseConfig>,
        producers: Vec<BaseProducerConfig>,
        database_factories: HashMap<String, DatabaseFactory>,
        producer_factories: HashMap<String, ProducerFactory>,
    ) -> Self {
        let database_configs = databases
            .into_iter()
            .map(|c| ((c.db_type.clone(), c.name.clone()), c))
            .collect();
        let producer_configs = producers
            .into_iter()
            .map(|c| ((c.producer_type.clone(), c.name.clone()), c))
            .collect();
        Registries {
            database_configs,
            producer_configs,
            database_factories,
            producer_factories,
            database_instances: SharedResourceRegistry::new(),
            producer_instances: SharedResourceRegistry::new(),
        }
    }

    pub async fn get_database(
        &self,
        db_type: &str,
        name: &str,
    ) -> Result<Arc<DatabaseExecutor>, Error> {
        let factory = self
            .database_factories
            .get(db_type)
            .ok_or_else(|| Error::UnknownType(db_type.to_string()))?
            .clone();
        let config = self
            .database_configs
            .get(&(db_type.to_string(), name.to_string()))
            .ok_or_else(|| Error::ConfigNotFound {
                kind: "database",
                name: name.to_string(),
            })?
            .clone();

        self.database_instances
            .get_or_create(db_type, name, || async move {
                let database = factory(&config)?;
                Ok(DatabaseExecutor::start(
                    database,
                    config.max_retries,
                    config.max_workers,
                ))
            })
            .await
    }

    pub async fn get_producer(
        &self,
        producer_type: &str,
        name: &str,
        topic: &str,
    ) -> Result<Arc<ProducerExecutor>, Error> {
        let factory = self
            .producer_factories
            .get(producer_type)
            .ok_or_else(|| Error::UnknownType(producer_type.to_string()))?
            .clone();
        let config = self
            .producer_configs
            .get(&(producer_type.to_string(), name.to_string()))
            .ok_or_else(|| Error::ConfigNotFound {
                kind: "producer",
                name: name.to_string(),
            })?
            .clone();
        if !config.allows_topic(topic) {
            return Err(Error::TopicNotAllowed {
                producer: name.to_string(),
                topic: topic.to_string(),
            });
        }

        self.producer_instances
            .get_or_create(producer_type, name, || async move {
                let producer = factory(&config)?;
                Ok(ProducerExecutor::start(producer, config.max_retries))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbEndpoint;
    use crate::testing::{RecordingDatabase, RecordingProducer};

    fn registries() -> Registries {
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
            max_retries: 5,
            max_workers: 4,
        }];
        let producers = vec![BaseProducerConfig {
            producer_type: "kafka".into(),
            name: "demo".into(),
            topics: Some(vec!["errors".into()]),
            max_retries: 5,
        }];
        let mut database_factories: HashMap<String, DatabaseFactory> = HashMap::new();
        database_factories.insert(
            "oracle".into(),
            Arc::new(|_: &BaseDatabaseConfig| {
                Ok(Arc::new(RecordingDatabase::succeeding()) as Arc<dyn Database>)
            }),
        );
        let mut producer_factories: HashMap<String, ProducerFactory> = HashMap::new();
        producer_factories.insert(
            "kafka".into(),
            Arc::new(|_: &BaseProducerConfig| {
                Ok(Arc::new(RecordingProducer::succeeding()) as Arc<dyn Producer>)
            }),
        );
        Registries::new(databases, producers, database_factories, producer_factories)
    }

    #[tokio::test]
    async fn unknown_type_fails_lookup() {
        let registries = registries();
        let err = registries.get_database("mysql", "orders").await.unwrap_err();
        assert!(matches!(err, Error::UnknownType(_)));
    }

    #[tokio::test]
    async fn unknown_name_fails_lookup() {
        let registries = registries();
        let err = registries
            .get_database("oracle", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[tokio::test]
    async fn topic_outside_allowlist_is_rejected() {
        let registries = registries();
        let err = registries
            .get_producer("kafka", "demo", "debug")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TopicNotAllowed { .. }));
    }

    #[tokio::test]
    async fn repeated_lookup_returns_same_instance() {
        let registries = registries();
        let a = registries.get_database("oracle", "orders").await.unwrap();
        let b = registries.get_database("oracle", "orders").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
