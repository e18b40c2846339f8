//! In-memory [`LocalStorage`] backed by [`DashMap`].

use dashmap::DashMap;

use super::LocalStorage;
use crate::error::LocalStorageError;

/// In-memory storage area.
///
/// An optional byte quota (summed over keys and values) makes writes fail the
/// way a full browser storage area does.
#[derive(Debug, Default)]
pub struct MemoryLocalStorage {
    items: DashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryLocalStorage {
    /// Creates an empty, unbounded area.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty area that rejects writes once `quota` bytes are used.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: DashMap::new(),
            quota: Some(quota),
        }
    }

    /// Bytes used by every entry except `exclude`.
    fn used_bytes(&self, exclude: &str) -> usize {
        self.items
            .iter()
            .filter(|entry| entry.key() != exclude)
            .map(|entry| entry.key().len() + entry.value().len())
            .sum()
    }
}

impl LocalStorage for MemoryLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        if let Some(quota) = self.quota {
            let needed = self.used_bytes(key) + key.len() + value.len();
            if needed > quota {
                return Err(LocalStorageError::QuotaExceeded { needed, quota });
            }
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), LocalStorageError> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, LocalStorageError> {
        Ok(self.items.iter().map(|entry| entry.key().clone()).collect())
    }
}
