//! Host-provided embedded key-value capability.
//!
//! When the host process offers a native per-key store, the adapter prefers it
//! over every other backend. Detection probes it with [`EmbeddedKv::keys`].

mod memory;
#[cfg(feature = "redb")]
mod redb_kv;

pub use memory::MemoryEmbeddedKv;
#[cfg(feature = "redb")]
pub use redb_kv::RedbEmbeddedKv;

use async_trait::async_trait;
use serde_json::Value;

/// Native per-key store offered by the host.
///
/// Used as `Arc<dyn EmbeddedKv>`.
#[async_trait]
pub trait EmbeddedKv: Send + Sync {
    /// Load the value stored under `key`.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    /// Store `value` under `key`.
    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// List every stored key. Also serves as the availability probe.
    async fn keys(&self) -> anyhow::Result<Vec<String>>;
}
