//! In-crate fakes for `Database`/`Producer`, used by executor and agent
//! tests. Not exported outside `#[cfg(test)]`.

use crate::errors::{Error, Result};
use crate::traits::{Database, Liveness, Message, Producer, QueryTask, Row};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct RecordingDatabase {
    fail_forever: bool,
    rows: Mutex<Vec<Row>>,
    calls: AtomicUsize,
}

impl RecordingDatabase {
    pub fn succeeding() -> Self {
        RecordingDatabase {
            fail_forever: false,
            rows: Mutex::new(vec![Row::new()]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        RecordingDatabase {
            fail_forever: true,
            rows: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Liveness for RecordingDatabase {
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
impl Database for RecordingDatabase {
    async fn execute(&self, _task: &QueryTask) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_forever {
            Err(Error::transient("synthetic failure"))
        } else {
            Ok(self.rows.lock().unwrap().clone())
        }
    }
}

pub struct RecordingProducer {
    fail_forever: bool,
    sent: AtomicUsize,
}

impl RecordingProducer {
    pub fn succeeding() -> Self {
        RecordingProducer {
            fail_forever: false,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        RecordingProducer {
            fail_forever: true,
            sent: AtomicUsize::new(0),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Liveness for RecordingProducer {
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
impl Producer for RecordingProducer {
    async fn send(&self, _message: &Message) -> Result<()> {
        if self.fail_forever {
            return Err(Error::transient("synthetic failure"));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
