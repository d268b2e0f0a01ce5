//! Reference drivers bundled with the CLI. Real deployments are expected to
//! register their own `Database`/`Producer` implementations against a
//! concrete client (an Oracle driver, a Kafka client, …); these log-only
//! drivers exist so the binary is runnable out of the box and so the
//! registry wiring below has something to construct.

use async_trait::async_trait;
use log::info;
use logtap_core::errors::Result;
use logtap_core::traits::{Database, Liveness, Message, Producer, QueryTask, Row};

pub struct ConsoleDatabase;

#[async_trait]
impl Liveness for ConsoleDatabase {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Database for ConsoleDatabase {
    async fn execute(&self, task: &QueryTask) -> Result<Vec<Row>> {
        info!("console database executing `{}` with {:?}", task.template, task.params);
        Ok(Vec::new())
    }
}

pub struct ConsoleProducer;

#[async_trait]
impl Liveness for ConsoleProducer {
    async fn is_connected(&self) -> bool {
        true
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Producer for ConsoleProducer {
    async fn send(&self, message: &Message) -> Result<()> {
        info!(
            "console producer delivering to topic {} (error={}, warning={}): {:?}",
            message.topic, message.is_error, message.is_warning, message.payload
        );
        Ok(())
    }
}
