//! In-memory storage backend

use super::traits::{SessionStore, StorageError, StorageResult, StoreKey};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Process-local session store.
///
/// Nothing survives the process. Writes can be switched to fail, which is
/// how tests exercise the "in-memory change succeeded, persistence failed" paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StoreKey, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of keys currently holding a value.
    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: StoreKey) -> StorageResult<Option<Value>> {
        Ok(self.values.lock().unwrap().get(&key).cloned())
    }

    fn put_many(&self, entries: &[(StoreKey, Value)]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store configured to reject writes".to_string(),
            ));
        }
        let mut values = self.values.lock().unwrap();
        for (key, value) in entries {
            values.insert(*key, value.clone());
        }
        Ok(())
    }
}
