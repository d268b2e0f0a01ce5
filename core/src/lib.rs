//! Log-tailing and enrichment pipeline core.
//!
//! Continuously tails a configured set of log files, extracts structured
//! records via named regular expressions, optionally enriches each record
//! with a parameterized database query, and forwards the result to
//! message-bus producers. Multiple independent [`agent::AgentRuntime`]
//! pipelines run side by side in one process; databases and producers are
//! shared, long-lived resources reused across agents via
//! [`registries::Registries`].
//!
//! The crate depends only on the narrow [`traits::Database`] and
//! [`traits::Producer`] interfaces — concrete drivers (an Oracle client, a
//! Kafka client, …) live in whatever binary wires this library up, such as
//! the `logtap` CLI.
//!
//! ```no_run
//! use logtap_core::agent::AgentRuntime;
//! use logtap_core::config::AgentConfig;
//! use logtap_core::registries::Registries;
//! use logtap_core::transform::Identity;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn run(config: AgentConfig, registries: Arc<Registries>) -> logtap_core::errors::Result<()> {
//! let agent = AgentRuntime::new(config, registries, Arc::new(Identity))?;
//! agent.start().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod errors;
pub mod executor;
pub mod orchestrator;
pub mod pathfile;
pub mod registries;
pub mod registry;
pub mod regex_source;
pub mod retry;
pub mod traits;
pub mod transform;
pub mod wdc;

mod utils;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
