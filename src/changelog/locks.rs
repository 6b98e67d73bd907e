//! Keyed mutexes for per-(resource, definition) append serialization.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Hands out one mutex per key so writers to the same key are mutually
/// exclusive while writers to different keys never contend.
pub struct KeyLockManager<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyLockManager<K> {
    pub fn new() -> Self {
        KeyLockManager {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get (or create) the lock for `key`. The registry lock is held only
    /// long enough to clone the Arc, never across the caller's critical
    /// section.
    pub fn get(&self, key: &K) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(key.clone()).or_default().clone()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyLockManager<K> {
    fn default() -> Self {
        Self::new()
    }
}
