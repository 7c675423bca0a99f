use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

/// Persistent byte store used for the surface interval. Hosts provide the
/// durable implementation.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Clones share their contents, so a host (or a test) can
/// keep a handle and inspect what was written.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Store for hosts without persistence: reads find nothing, writes fail.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreNotConfigured;

impl KeyValueStore for StoreNotConfigured {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn set(&mut self, _key: &str, _value: Vec<u8>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("storage not configured".to_string()))
    }

    fn remove(&mut self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
