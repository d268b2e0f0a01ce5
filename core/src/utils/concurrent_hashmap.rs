use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

pub struct ConcurrentHashMap<K, V> {
    inner: Arc<RwLock<HashMap<K, V>>>,
}

#[allow(dead_code)]
impl<K, V> ConcurrentHashMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::with_capacity(capacity))),
        }
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut map = self.inner.write().unwrap();
        map.insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().unwrap();
        map.get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.inner.write().unwrap();
        map.remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let map = self.inner.read().unwrap();
        map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap();
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        let map = self.inner.read().unwrap();
        map.is_empty()
    }

    pub fn clear(&self) {
        let mut map = self.inner.write().unwrap();
        map.clear();
    }

    pub fn keys(&self) -> Vec<K> {
        let map = self.inner.read().unwrap();
        map.keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        let map = self.inner.read().unwrap();
        map.values().cloned().collect()
    }

    pub fn insert_or_update<F>(&self, key: K, value: V, update_fn: F) -> V
    where
        F: FnOnce(&V) -> V,
    {
        let mut map = self.inner.write().unwrap();
        match map.get(&key) {
            Some(existing_value) => {
                let new_value = update_fn(existing_value);
                map.insert(key, new_value.clone());
                new_value
            }
            None => {
                map.insert(key, value.clone());
                value
            }
        }
    }

    pub fn with_read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&HashMap<K, V>) -> R,
    {
        let map = self.inner.read().unwrap();
        f(&*map)
    }

    pub fn with_write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<K, V>) -> R,
    {
        let mut map = self.inner.write().unwrap();
        f(&mut *map)
    }
}

impl<K, V> Clone for ConcurrentHashMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for ConcurrentHashMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
