use crate::traits::Row;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WdcStatus {
    Ready,
    QueryRunning,
    Updated,
    Expired,
}

/// The runtime record flowing through one agent's pipeline. Created once
/// per regex match (or seeded at startup for query-only flows) and mutated
/// only by its owning agent's worker, except for the database completion
/// callback, which posts results back through the agent's inbox rather
/// than touching this struct from another task.
#[derive(Debug, Clone)]
pub struct WorkingDataConnection {
    pub name: String,
    pub producer_type: String,
    pub producer_name: String,
    pub topic: String,
    pub database_type: Option<String>,
    pub database_name: Option<String>,
    pub query_template: Option<String>,
    pub is_error: bool,
    pub is_warning: bool,
    pub ttl_minutes: Option<i64>,

    pub status: WdcStatus,
    pub match_dict: HashMap<String, String>,
    pub query_source_dict: HashMap<String, String>,
    pub result_dict: Row,
    pub result_list: Vec<Row>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl WorkingDataConnection {
    pub fn new(
        name: String,
        producer_type: String,
        producer_name: String,
        topic: String,
        database_type: Option<String>,
        database_name: Option<String>,
        query_template: Option<String>,
        is_error: bool,
        is_warning: bool,
        ttl_minutes: Option<i64>,
        match_dict: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = ttl_minutes.map(|m| now + ChronoDuration::minutes(m));
        WorkingDataConnection {
            name,
            producer_type,
            producer_name,
            topic,
            database_type,
            database_name,
            query_template,
            is_error,
            is_warning,
            ttl_minutes,
            status: WdcStatus::Ready,
            match_dict,
            query_source_dict: HashMap::new(),
            result_dict: Row::new(),
            result_list: Vec::new(),
            expires_at,
        }
    }

    pub fn has_database_binding(&self) -> bool {
        self.database_type.is_some() && self.query_template.is_some()
    }

    /// Transitions to `Expired` when `now` is past `expires_at`. A WDC with
    /// no `ttl_minutes` configured never expires on its own.
    pub fn check_expired_time(&mut self, now: DateTime<Utc>) {
        if let Some(expires_at) = self.expires_at {
            if now > expires_at {
                self.status = WdcStatus::Expired;
            }
        }
    }

    /// Sets `expires_at = now + m`. Passing `0` forces immediate expiry on
    /// the next `check_expired_time`.
    pub fn update_expired_time(&mut self, minutes: i64, now: DateTime<Utc>) {
        self.expires_at = Some(now + ChronoDuration::minutes(minutes));
    }

    pub fn force_expire(&mut self) {
        self.status = WdcStatus::Expired;
    }
}
