//! [`KvAdapter`]: the uniform key-value surface over whichever backend is active.

use std::sync::Arc;

use demoday_core::{BackendMode, RemoteCredentials, StorageInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::AdapterConfig;
use crate::detector::{ActiveBackend, BackendDetector};
use crate::embedded::EmbeddedKv;
use crate::error::{ConfigureError, RemoteError};
use crate::local::{LocalStorage, MemoryLocalStorage, SharedDocumentStore};
use crate::remote::{DocumentApi, FlushOutcome, GistClient, SyncStatus};

/// Key-value storage shared by every part of the application.
///
/// Create one per process and hand it out as `Arc<KvAdapter>`. The backend is
/// detected on first use. Data operations never fail: backend errors are
/// logged and reads fall back to "absent".
pub struct KvAdapter {
    detector: BackendDetector,
}

impl KvAdapter {
    #[must_use]
    pub fn builder() -> KvAdapterBuilder {
        KvAdapterBuilder::default()
    }

    /// Returns the value under `key`, or `None` when it is absent, unreadable,
    /// or does not deserialize into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "stored value has unexpected shape");
                None
            }
        }
    }

    /// Returns the raw JSON value under `key`.
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        match self.detector.detect().await.as_ref() {
            ActiveBackend::Embedded(kv) => kv.get(key).await.unwrap_or_else(|e| {
                tracing::warn!(key = %key, error = %e, "embedded read failed");
                None
            }),
            ActiveBackend::Remote(remote) => remote.get(key).await,
            ActiveBackend::Local(local) => {
                let key = key.to_string();
                local.blocking(move |s| s.get(&key)).await.flatten()
            }
        }
    }

    /// Stores `value` under `key`.
    ///
    /// On the remote backend this returns once the change is queued; it
    /// reaches the remote document on the next flush.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.set_value(key, value).await,
            Err(e) => tracing::warn!(key = %key, error = %e, "value not serializable; write dropped"),
        }
    }

    pub async fn set_value(&self, key: &str, value: Value) {
        match self.detector.detect().await.as_ref() {
            ActiveBackend::Embedded(kv) => {
                if let Err(e) = kv.set(key, value).await {
                    tracing::warn!(key = %key, error = %e, "embedded write failed");
                }
            }
            ActiveBackend::Remote(remote) => remote.set(key, value),
            ActiveBackend::Local(local) => {
                let key = key.to_string();
                local.blocking(move |s| s.set(&key, value)).await;
            }
        }
    }

    /// Removes `key`. Removing an absent key is not an error.
    pub async fn delete(&self, key: &str) {
        match self.detector.detect().await.as_ref() {
            ActiveBackend::Embedded(kv) => {
                if let Err(e) = kv.delete(key).await {
                    tracing::warn!(key = %key, error = %e, "embedded delete failed");
                }
            }
            ActiveBackend::Remote(remote) => remote.delete(key),
            ActiveBackend::Local(local) => {
                let key = key.to_string();
                local.blocking(move |s| s.delete(&key)).await;
            }
        }
    }

    /// Lists every stored key, including unflushed remote writes.
    pub async fn keys(&self) -> Vec<String> {
        match self.detector.detect().await.as_ref() {
            ActiveBackend::Embedded(kv) => kv.keys().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "embedded key listing failed");
                Vec::new()
            }),
            ActiveBackend::Remote(remote) => remote.keys().await,
            ActiveBackend::Local(local) => local
                .blocking(SharedDocumentStore::keys)
                .await
                .unwrap_or_default(),
        }
    }

    /// Pushes queued remote changes now. Other backends write through, so
    /// this is `Idle` for them.
    pub async fn flush(&self) -> FlushOutcome {
        match self.detector.detect().await.as_ref() {
            ActiveBackend::Remote(remote) => remote.flush().await,
            ActiveBackend::Embedded(_) | ActiveBackend::Local(_) => FlushOutcome::Idle,
        }
    }

    /// Points the adapter at a remote document and persists the credentials.
    ///
    /// With `existing_document_id`, the document is used if `token` can read
    /// it. Otherwise, or if it cannot be read, a new document is created.
    /// Returns the identifier of the document now in use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::MissingToken`] for an empty token,
    /// [`ConfigureError::Create`] if a new document could not be created, and
    /// [`ConfigureError::Persist`] if the credentials could not be saved.
    pub async fn configure_remote_storage(
        &self,
        token: &str,
        existing_document_id: Option<&str>,
    ) -> Result<String, ConfigureError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ConfigureError::MissingToken);
        }
        let api = self.detector.api();

        let existing = existing_document_id.map(str::trim).filter(|id| !id.is_empty());
        let mut verified = None;
        if let Some(id) = existing {
            let creds = RemoteCredentials::new(token, id);
            let readable = api.fetch_document(&creds).await;
            match readable {
                // A document that exists but does not parse is still ours.
                Ok(_) | Err(RemoteError::Decode(_)) => verified = Some(creds),
                Err(e) => {
                    tracing::warn!(document_id = %id, error = %e, "existing remote document not usable; creating a new one");
                }
            }
        }

        let creds = match verified {
            Some(creds) => creds,
            None => {
                let id = api
                    .create_document(token)
                    .await
                    .map_err(ConfigureError::Create)?;
                tracing::info!(document_id = %id, "remote document created");
                RemoteCredentials::new(token, id)
            }
        };

        self.detector.credentials().save(&creds)?;
        let document_id = creds.document_id.clone();
        self.detector.switch_to_remote(creds).await;
        Ok(document_id)
    }

    /// Forgets the persisted remote credentials and detects the backend again.
    ///
    /// Queued remote changes are flushed first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::Persist`] if the credentials could not be
    /// removed from local storage.
    pub async fn clear_remote_storage(&self) -> Result<(), ConfigureError> {
        self.detector.credentials().clear()?;
        self.detector.reset().await;
        tracing::info!("remote storage disconnected");
        Ok(())
    }

    /// Mode already in use, without triggering detection.
    #[must_use]
    pub fn storage_mode(&self) -> Option<BackendMode> {
        self.detector.current().map(|active| active.mode())
    }

    /// Describes the active backend, detecting it if needed.
    pub async fn storage_info(&self) -> StorageInfo {
        StorageInfo::for_mode(self.detector.detect().await.mode())
    }

    /// Sync state of the remote backend, when it is the one in use.
    #[must_use]
    pub fn status(&self) -> Option<SyncStatus> {
        match self.detector.current()?.as_ref() {
            ActiveBackend::Remote(remote) => Some(remote.status()),
            ActiveBackend::Embedded(_) | ActiveBackend::Local(_) => None,
        }
    }
}

/// Builder for [`KvAdapter`].
///
/// Without a local storage area the adapter uses a process-local memory area;
/// without a document API it talks HTTP to `config.remote.base_url`.
#[derive(Default)]
pub struct KvAdapterBuilder {
    config: AdapterConfig,
    area: Option<Arc<dyn LocalStorage>>,
    embedded: Option<Arc<dyn EmbeddedKv>>,
    api: Option<Arc<dyn DocumentApi>>,
}

impl KvAdapterBuilder {
    #[must_use]
    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_local_storage(mut self, area: Arc<dyn LocalStorage>) -> Self {
        self.area = Some(area);
        self
    }

    /// Offers a host key-value store; it is used if it answers a probe.
    #[must_use]
    pub fn with_embedded(mut self, embedded: Arc<dyn EmbeddedKv>) -> Self {
        self.embedded = Some(embedded);
        self
    }

    #[must_use]
    pub fn with_document_api(mut self, api: Arc<dyn DocumentApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// # Errors
    ///
    /// Returns an error if no document API was given and the default HTTP
    /// client cannot be constructed.
    pub fn build(self) -> Result<KvAdapter, RemoteError> {
        let api = match self.api {
            Some(api) => api,
            None => Arc::new(GistClient::new(self.config.remote.clone())?),
        };
        let area = self
            .area
            .unwrap_or_else(|| Arc::new(MemoryLocalStorage::new()));
        Ok(KvAdapter {
            detector: BackendDetector::new(self.embedded, area, api, self.config),
        })
    }
}
