use crate::errors::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// One result row: column name to value, matching whatever textual
/// representation the concrete driver returns.
pub type Row = BTreeMap<String, String>;

/// A query submitted to a [`crate::executor::DatabaseExecutor`].
#[derive(Debug, Clone)]
pub struct QueryTask {
    pub template: String,
    pub params: HashMap<String, String>,
}

/// Something a producer can send: a single row or a multi-row result, tagged
/// with the routing metadata the worker needs.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub is_error: bool,
    pub is_warning: bool,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Single(BTreeMap<String, String>),
    Many(Vec<BTreeMap<String, String>>),
}

/// Connect/liveness/close surface the connection orchestrator drives,
/// shared by both database and producer resources.
#[async_trait]
pub trait Liveness: Send + Sync {
    async fn is_connected(&self) -> bool;
    async fn connect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Narrow contract a concrete database driver implements. The core never
/// knows about connection strings, drivers, or wire formats beyond this.
#[async_trait]
pub trait Database: Liveness {
    async fn execute(&self, task: &QueryTask) -> Result<Vec<Row>>;
}

/// Narrow contract a concrete message-bus producer implements.
#[async_trait]
pub trait Producer: Liveness {
    async fn send(&self, message: &Message) -> Result<()>;
}
