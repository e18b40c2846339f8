//! Durable [`EmbeddedKv`] backed by a `redb` database file.
//!
//! Values are stored as JSON text in a single `&str -> &str` table. `redb`
//! transactions are blocking, so every call runs on the blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;

use super::EmbeddedKv;

const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// Embedded store persisted in a `redb` file.
#[derive(Clone)]
pub struct RedbEmbeddedKv {
    db: Arc<Database>,
}

impl RedbEmbeddedKv {
    /// Opens or creates the database at `path` and ensures the table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or initialised.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Database::create(path.as_ref())?;
        let txn = db.begin_write()?;
        {
            txn.open_table(ENTRIES)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

#[async_trait]
impl EmbeddedKv for RedbEmbeddedKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let key = key.to_string();
        let raw = self
            .blocking(move |db| {
                let txn = db.begin_read()?;
                let table = txn.open_table(ENTRIES)?;
                let raw = table.get(key.as_str())?.map(|v| v.value().to_string());
                Ok(raw)
            })
            .await?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(Into::into))
            .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let key = key.to_string();
        let raw = serde_json::to_string(&value)?;
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(ENTRIES)?;
                table.insert(key.as_str(), raw.as_str())?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(ENTRIES)?;
                table.remove(key.as_str())?;
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        self.blocking(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(ENTRIES)?;
            let mut keys = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                keys.push(key.value().to_string());
            }
            Ok(keys)
        })
        .await
    }
}
