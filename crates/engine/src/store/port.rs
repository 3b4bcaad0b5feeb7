// Key/value storage port used by every local store.
//
// Stores never reach for global state: they receive a `StoragePort` at
// construction. `MemoryStore` is the in-process backend (tests, ephemeral
// sessions) and `SqliteStore` the durable one. Both can enforce a byte quota,
// which is how capacity failures reach the degradation ladder.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "storage quota exceeded writing `{key}`: {requested} bytes requested, {available} available"
    )]
    QuotaExceeded { key: String, requested: usize, available: usize },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

pub trait StoragePort: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

impl<T: StoragePort + ?Sized> StoragePort for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        (**self).keys()
    }
}

/// Bytes an entry occupies against a quota.
pub(crate) fn entry_bytes(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// In-memory backend with an optional byte quota over keys and values.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self { entries: Mutex::default(), quota_bytes: Some(quota_bytes) }
    }

    /// Bytes currently in use.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .lock()
            .map(|entries| entries.iter().map(|(k, v)| entry_bytes(k, v)).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.entries.lock().map_err(|_| anyhow!("memory store lock poisoned").into())
    }
}

impl StoragePort for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries.iter().map(|(k, v)| entry_bytes(k, v)).sum();
            let replaced = entries.get(key).map(|old| entry_bytes(key, old)).unwrap_or(0);
            let available = quota.saturating_sub(used - replaced);
            let requested = entry_bytes(key, value);
            if requested > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    requested,
                    available,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
