//! Queue+worker pairs owning a shared database or producer resource.
//! [`database`] runs a worker pool behind one dispatcher; [`producer`] runs
//! a single dispatcher/worker. Both share the retry/backoff shape in
//! [`crate::retry`].

mod database;
mod producer;

pub use database::DatabaseExecutor;
pub use producer::ProducerExecutor;

use std::time::Duration;

/// Dispatchers poll their queue with this timeout before re-checking the
/// stop flag.
pub(crate) const QUEUE_POLL: Duration = Duration::from_millis(500);
