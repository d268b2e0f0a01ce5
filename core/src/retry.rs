use rand::Rng;
use std::time::Duration;

/// A unit of work threaded through an executor's dispatcher/worker loop,
/// carrying its own retry counter so failure handling never needs to throw.
#[derive(Debug, Clone)]
pub struct Task<P> {
    pub payload: P,
    pub retries: u32,
}

impl<P> Task<P> {
    pub fn new(payload: P) -> Self {
        Task { payload, retries: 0 }
    }

    pub fn bumped(self) -> Self {
        Task {
            payload: self.payload,
            retries: self.retries + 1,
        }
    }

    pub fn exhausted(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }
}

/// `2^retries + rand(0,10)` seconds, the backoff delay both executors sleep
/// for between re-enqueueing a failed task.
pub fn backoff_delay(retries: u32) -> Duration {
    let base = 2u64.saturating_pow(retries);
    let jitter = rand::thread_rng().gen_range(0..=10);
    Duration::from_secs(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bumping_increments_retry_counter() {
        let task = Task::new("q").bumped().bumped();
        assert_eq!(task.retries, 2);
    }

    #[test]
    fn exhausted_compares_against_max_retries() {
        let task = Task::new("q");
        assert!(!task.exhausted(2));
        let task = task.bumped().bumped();
        assert!(task.exhausted(2));
    }

    #[test]
    fn backoff_delay_grows_with_retries_plus_jitter() {
        for retries in 0..5 {
            let d = backoff_delay(retries);
            let base = 2u64.pow(retries);
            assert!(d.as_secs() >= base && d.as_secs() <= base + 10);
        }
    }
}
