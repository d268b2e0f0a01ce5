use crate::errors::Error;
use crate::utils::concurrent_hashmap::ConcurrentHashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One instance per `(type, name)` key, constructed lazily under a lock the
/// first time it's requested and cached for every caller after that.
pub struct SharedResourceRegistry<T> {
    instances: ConcurrentHashMap<(String, String), Arc<T>>,
    construction_lock: Mutex<()>,
}

impl<T> Default for SharedResourceRegistry<T> {
    fn default() -> Self {
        SharedResourceRegistry {
            instances: ConcurrentHashMap::new(),
            construction_lock: Mutex::new(()),
        }
    }
}

impl<T> SharedResourceRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instance for `(kind, name)`, constructing it via
    /// `build` under a lock on first access. Double-checked: the lock is
    /// only taken when the fast path misses.
    pub async fn get_or_create<F, Fut>(
        &self,
        kind: &str,
        name: &str,
        build: F,
    ) -> Result<Arc<T>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let key = (kind.to_string(), name.to_string());
        if let Some(existing) = self.instances.get(&key) {
            return Ok(existing);
        }

        let _guard = self.construction_lock.lock().await;
        if let Some(existing) = self.instances.get(&key) {
            return Ok(existing);
        }

        let built = Arc::new(build().await?);
        self.instances.insert(key, built.clone());
        Ok(built)
    }
}
