//! Local fallback backend: one shared logical document under a reserved key.

use std::sync::Arc;

use demoday_core::document::{apply_change, parse_document_lossy};
use demoday_core::{Document, PendingChange};
use parking_lot::Mutex;
use serde_json::Value;

use super::LocalStorage;

/// Logical document stored whole under one key of a [`LocalStorage`] area.
///
/// Every role (admin, judges) using the same area sees the same document.
/// Each operation reads the whole document, mutates it, and writes it back.
/// Nothing here fails towards the caller: a corrupt document reads as empty
/// and a failed write is logged and dropped.
///
/// Clones share the area and the write lock.
#[derive(Clone)]
pub struct SharedDocumentStore {
    area: Arc<dyn LocalStorage>,
    key: String,
    write_lock: Arc<Mutex<()>>,
}

impl SharedDocumentStore {
    /// Creates a store keeping its document under `key` in `area`.
    #[must_use]
    pub fn new(area: Arc<dyn LocalStorage>, key: impl Into<String>) -> Self {
        Self {
            area,
            key: key.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs `f` against a clone of this store on the blocking pool.
    ///
    /// Areas such as [`FileLocalStorage`](super::FileLocalStorage) do
    /// synchronous file I/O. Returns `None` if the blocking task panicked.
    pub async fn blocking<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&SharedDocumentStore) -> T + Send + 'static,
    {
        let store = self.clone();
        match tokio::task::spawn_blocking(move || f(&store)).await {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "shared document task failed");
                None
            }
        }
    }

    /// Reads the whole document. Unreadable or corrupt content is empty.
    #[must_use]
    pub fn load(&self) -> Document {
        match self.area.get_item(&self.key) {
            Ok(Some(raw)) => parse_document_lossy(&raw, &self.key),
            Ok(None) => Document::new(),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "failed to read shared document");
                Document::new()
            }
        }
    }

    fn save(&self, doc: &Document) {
        let raw = match serde_json::to_string(doc) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "failed to serialize shared document");
                return;
            }
        };
        if let Err(e) = self.area.set_item(&self.key, &raw) {
            tracing::error!(key = %self.key, error = %e, "failed to write shared document; change dropped");
        }
    }

    fn mutate(&self, key: &str, change: &PendingChange) {
        let _guard = self.write_lock.lock();
        let mut doc = self.load();
        apply_change(&mut doc, key, change);
        self.save(&doc);
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.load().remove(key)
    }

    /// Stores `value` under `key`.
    pub fn set(&self, key: &str, value: Value) {
        self.mutate(key, &PendingChange::Put(value));
    }

    /// Removes `key` from the document.
    pub fn delete(&self, key: &str) {
        self.mutate(key, &PendingChange::Delete);
    }

    /// Lists the document's keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.load().into_iter().map(|(k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::SHARED_DOCUMENT_KEY;
    use crate::local::MemoryLocalStorage;

    fn store() -> (Arc<MemoryLocalStorage>, SharedDocumentStore) {
        let area = Arc::new(MemoryLocalStorage::new());
        let store = SharedDocumentStore::new(area.clone(), SHARED_DOCUMENT_KEY);
        (area, store)
    }

    #[test]
    fn set_then_get_and_raw_layout() {
        let (area, store) = store();
        store.set("judges", json!([]));

        assert_eq!(store.get("judges"), Some(json!([])));
        let raw = area.get_item(SHARED_DOCUMENT_KEY).unwrap().unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, json!({"judges": []}));
    }

    #[test]
    fn empty_area_has_no_keys() {
        let (_area, store) = store();
        assert!(store.keys().is_empty());
        assert_eq!(store.get("programs"), None);
    }

    #[test]
    fn delete_removes_key() {
        let (_area, store) = store();
        store.set("teams", json!(["t1"]));
        store.set("projects", json!(["p1"]));
        store.delete("teams");

        assert_eq!(store.keys(), vec!["projects"]);
        assert_eq!(store.get("teams"), None);
    }

    #[test]
    fn corrupt_document_reads_as_empty_and_is_replaced_on_write() {
        let (area, store) = store();
        area.set_item(SHARED_DOCUMENT_KEY, "{oops").unwrap();

        assert!(store.keys().is_empty());
        store.set("voting_closed", json!(true));
        assert_eq!(store.keys(), vec!["voting_closed"]);
    }

    #[test]
    fn quota_failure_drops_write_without_panicking() {
        let area = Arc::new(MemoryLocalStorage::with_quota(40));
        let store = SharedDocumentStore::new(area, SHARED_DOCUMENT_KEY);

        store.set("a", json!(1));
        store.set("evaluations", json!(["x".repeat(100)]));

        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(store.get("evaluations"), None);
    }

    #[tokio::test]
    async fn blocking_calls_share_the_write_lock_and_area() {
        let (_area, store) = store();
        let writes: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .blocking(move |s| s.set(&format!("k{i}"), json!(i)))
                        .await
                })
            })
            .collect();
        for write in writes {
            assert_eq!(write.await.unwrap(), Some(()));
        }

        let keys = store.blocking(SharedDocumentStore::keys).await.unwrap();
        assert_eq!(keys.len(), 8);
        assert_eq!(store.get("k3"), Some(json!(3)));
    }

    #[test]
    fn other_area_keys_are_not_document_keys() {
        let (area, store) = store();
        area.set_item("meetup_gist_id", "abc").unwrap();
        store.set("programs", json!([]));
        assert_eq!(store.keys(), vec!["programs"]);
    }
}
