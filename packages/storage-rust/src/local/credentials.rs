//! Persisted remote credentials.

use std::sync::Arc;

use demoday_core::RemoteCredentials;

use super::LocalStorage;
use crate::config::StorageKeys;
use crate::error::LocalStorageError;

/// Reads and writes the remote access token and document id in a
/// [`LocalStorage`] area.
pub struct CredentialStore {
    area: Arc<dyn LocalStorage>,
    token_key: String,
    document_id_key: String,
}

impl CredentialStore {
    #[must_use]
    pub fn new(area: Arc<dyn LocalStorage>, keys: &StorageKeys) -> Self {
        Self {
            area,
            token_key: keys.remote_token.clone(),
            document_id_key: keys.remote_document_id.clone(),
        }
    }

    /// Returns the persisted credentials when both halves are present and
    /// non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be read.
    pub fn load(&self) -> Result<Option<RemoteCredentials>, LocalStorageError> {
        let token = self.area.get_item(&self.token_key)?;
        let document_id = self.area.get_item(&self.document_id_key)?;
        Ok(match (token, document_id) {
            (Some(token), Some(document_id)) if !token.is_empty() && !document_id.is_empty() => {
                Some(RemoteCredentials { token, document_id })
            }
            _ => None,
        })
    }

    /// Persists both halves of `creds`.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be written.
    pub fn save(&self, creds: &RemoteCredentials) -> Result<(), LocalStorageError> {
        self.area.set_item(&self.document_id_key, &creds.document_id)?;
        self.area.set_item(&self.token_key, &creds.token)
    }

    /// Removes both halves.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be written.
    pub fn clear(&self) -> Result<(), LocalStorageError> {
        self.area.remove_item(&self.token_key)?;
        self.area.remove_item(&self.document_id_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalStorage;

    fn store() -> (Arc<MemoryLocalStorage>, CredentialStore) {
        let area = Arc::new(MemoryLocalStorage::new());
        let creds = CredentialStore::new(area.clone(), &StorageKeys::default());
        (area, creds)
    }

    #[test]
    fn save_then_load() {
        let (area, store) = store();
        store.save(&RemoteCredentials::new("tok", "doc-1")).unwrap();

        assert_eq!(area.get_item("meetup_github_token").unwrap().as_deref(), Some("tok"));
        assert_eq!(area.get_item("meetup_gist_id").unwrap().as_deref(), Some("doc-1"));
        assert_eq!(
            store.load().unwrap(),
            Some(RemoteCredentials::new("tok", "doc-1"))
        );
    }

    #[test]
    fn half_configured_is_absent() {
        let (area, store) = store();
        area.set_item("meetup_github_token", "tok").unwrap();
        assert_eq!(store.load().unwrap(), None);

        area.set_item("meetup_gist_id", "").unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn clear_removes_both() {
        let (area, store) = store();
        store.save(&RemoteCredentials::new("tok", "doc-1")).unwrap();
        store.clear().unwrap();
        assert!(area.keys().unwrap().is_empty());
        assert_eq!(store.load().unwrap(), None);
    }
}
