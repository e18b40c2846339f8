//! Backend selection.
//!
//! Priority is embedded, then remote, then local. The decision is made once
//! and memoized; concurrent callers that arrive before it is made wait on the
//! same probe instead of probing again. Only remote (re)configuration changes
//! the decision afterwards.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use demoday_core::{BackendMode, RemoteCredentials};

use crate::config::AdapterConfig;
use crate::embedded::EmbeddedKv;
use crate::local::{CredentialStore, LocalStorage, SharedDocumentStore};
use crate::metrics::record_backend_resolved;
use crate::remote::{DocumentApi, FlushOutcome, WriteCoalescer};

/// The resolved backend every facade operation dispatches to.
pub(crate) enum ActiveBackend {
    Embedded(Arc<dyn EmbeddedKv>),
    Remote(WriteCoalescer),
    Local(SharedDocumentStore),
}

impl ActiveBackend {
    pub(crate) fn mode(&self) -> BackendMode {
        match self {
            Self::Embedded(_) => BackendMode::Embedded,
            Self::Remote(_) => BackendMode::Remote,
            Self::Local(_) => BackendMode::Local,
        }
    }
}

pub(crate) struct BackendDetector {
    embedded: Option<Arc<dyn EmbeddedKv>>,
    area: Arc<dyn LocalStorage>,
    credentials: CredentialStore,
    api: Arc<dyn DocumentApi>,
    config: AdapterConfig,
    resolved: ArcSwapOption<ActiveBackend>,
    // Serializes resolution and switching; never held by data operations.
    probe_lock: tokio::sync::Mutex<()>,
}

impl BackendDetector {
    pub(crate) fn new(
        embedded: Option<Arc<dyn EmbeddedKv>>,
        area: Arc<dyn LocalStorage>,
        api: Arc<dyn DocumentApi>,
        config: AdapterConfig,
    ) -> Self {
        let credentials = CredentialStore::new(Arc::clone(&area), &config.keys);
        Self {
            embedded,
            area,
            credentials,
            api,
            config,
            resolved: ArcSwapOption::empty(),
            probe_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub(crate) fn api(&self) -> &Arc<dyn DocumentApi> {
        &self.api
    }

    /// Backend currently in use, without resolving one.
    pub(crate) fn current(&self) -> Option<Arc<ActiveBackend>> {
        self.resolved.load_full()
    }

    /// Returns the active backend, resolving it on first use.
    pub(crate) async fn detect(&self) -> Arc<ActiveBackend> {
        if let Some(active) = self.resolved.load_full() {
            return active;
        }
        let _probe = self.probe_lock.lock().await;
        if let Some(active) = self.resolved.load_full() {
            return active;
        }

        let active = Arc::new(self.resolve().await);
        let mode = active.mode();
        record_backend_resolved(mode);
        tracing::info!(mode = %mode, "storage backend selected");
        self.resolved.store(Some(Arc::clone(&active)));
        active
    }

    async fn resolve(&self) -> ActiveBackend {
        if let Some(embedded) = &self.embedded {
            match embedded.keys().await {
                Ok(_) => return ActiveBackend::Embedded(Arc::clone(embedded)),
                Err(e) => {
                    tracing::warn!(error = %e, "embedded store not reachable; checking remote credentials");
                }
            }
        }

        match self.credentials.load() {
            Ok(Some(creds)) => return ActiveBackend::Remote(self.remote(creds)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to read remote credentials; using local storage");
            }
        }

        ActiveBackend::Local(SharedDocumentStore::new(
            Arc::clone(&self.area),
            self.config.keys.shared_document.clone(),
        ))
    }

    fn remote(&self, creds: RemoteCredentials) -> WriteCoalescer {
        WriteCoalescer::new(Arc::clone(&self.api), creds, self.config.sync.clone())
    }

    /// Routes every later operation to the remote document `creds` names.
    ///
    /// The new backend is published before the previous remote document is
    /// flushed, so writes from callers still holding the old backend land in
    /// its queue while the flush runs and are drained with it.
    pub(crate) async fn switch_to_remote(&self, creds: RemoteCredentials) {
        let _probe = self.probe_lock.lock().await;
        let document_id = creds.document_id.clone();
        let next = Arc::new(ActiveBackend::Remote(self.remote(creds)));
        let previous = self.resolved.swap(Some(next));
        record_backend_resolved(BackendMode::Remote);
        tracing::info!(document_id = %document_id, "storage backend switched to remote");
        retire(previous).await;
    }

    /// Forgets the decision so the next operation detects again.
    pub(crate) async fn reset(&self) {
        let _probe = self.probe_lock.lock().await;
        let previous = self.resolved.swap(None);
        retire(previous).await;
    }
}

/// Flushes a replaced remote backend until its queue stays empty.
async fn retire(previous: Option<Arc<ActiveBackend>>) {
    let Some(previous) = previous else {
        return;
    };
    let ActiveBackend::Remote(remote) = previous.as_ref() else {
        return;
    };
    loop {
        match remote.flush().await {
            FlushOutcome::Flushed(_) if remote.status().pending_changes > 0 => {}
            FlushOutcome::Requeued { changes, .. } => {
                tracing::warn!(
                    changes,
                    document_id = %remote.credentials().document_id,
                    "leaving remote document with unflushed changes"
                );
                return;
            }
            FlushOutcome::Flushed(_) | FlushOutcome::Idle | FlushOutcome::Aborted => return,
        }
    }
}
