//! In-memory [`EmbeddedKv`] backed by [`DashMap`].
//!
//! Suitable for hosts that share one process between every role, and for tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::EmbeddedKv;

/// In-memory embedded store.
#[derive(Debug, Default)]
pub struct MemoryEmbeddedKv {
    entries: DashMap<String, Value>,
}

impl MemoryEmbeddedKv {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddedKv for MemoryEmbeddedKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}
