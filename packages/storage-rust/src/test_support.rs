//! In-process fakes shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use demoday_core::{Document, RemoteCredentials};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::RemoteError;
use crate::remote::DocumentApi;

pub(crate) fn doc(pairs: &[(&str, Value)]) -> Document {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Failure a [`FakeDocumentApi`] call can be told to return.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    Unavailable,
    RateLimited,
    RateLimitedFor(Duration),
    Unauthorized,
    Forbidden,
    Malformed,
}

impl Failure {
    fn to_error(self) -> RemoteError {
        match self {
            Self::Unavailable => RemoteError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "unavailable".into(),
            },
            Self::RateLimited => RemoteError::RateLimited { retry_after: None },
            Self::RateLimitedFor(wait) => RemoteError::RateLimited {
                retry_after: Some(wait),
            },
            Self::Unauthorized => RemoteError::Unauthorized,
            Self::Forbidden => RemoteError::Forbidden {
                message: "Resource not accessible".into(),
            },
            Self::Malformed => RemoteError::Decode("expected value at line 1 column 2".into()),
        }
    }
}

/// Single-document remote store living in memory.
///
/// The document answers to id `doc-1` until `create_document` mints a new id;
/// any other id is `NotFound`.
pub(crate) struct FakeDocumentApi {
    document: Mutex<Document>,
    document_id: Mutex<String>,
    fetch_failure: Mutex<Option<Failure>>,
    replace_failure: Mutex<Option<Failure>>,
    create_failure: Mutex<Option<Failure>>,
    replace_latency: Mutex<Duration>,
    in_flight_replaces: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub replace_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub max_concurrent_replaces: AtomicUsize,
}

impl FakeDocumentApi {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            document: Mutex::new(document),
            document_id: Mutex::new("doc-1".to_string()),
            fetch_failure: Mutex::new(None),
            replace_failure: Mutex::new(None),
            create_failure: Mutex::new(None),
            replace_latency: Mutex::new(Duration::ZERO),
            in_flight_replaces: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            replace_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            max_concurrent_replaces: AtomicUsize::new(0),
        }
    }

    /// Current remote document.
    pub fn document(&self) -> Document {
        self.document.lock().clone()
    }

    /// Id the remote document currently answers to.
    pub fn document_id(&self) -> String {
        self.document_id.lock().clone()
    }

    /// Overwrites the remote document as another client would.
    pub fn replace_remote(&self, document: Document) {
        *self.document.lock() = document;
    }

    pub fn fail_fetches(&self, failure: Failure) {
        *self.fetch_failure.lock() = Some(failure);
    }

    pub fn fail_replaces(&self, failure: Failure) {
        *self.replace_failure.lock() = Some(failure);
    }

    pub fn fail_creates(&self, failure: Failure) {
        *self.create_failure.lock() = Some(failure);
    }

    pub fn fail_all(&self, failure: Failure) {
        self.fail_fetches(failure);
        self.fail_replaces(failure);
        self.fail_creates(failure);
    }

    pub fn clear_failures(&self) {
        *self.fetch_failure.lock() = None;
        *self.replace_failure.lock() = None;
        *self.create_failure.lock() = None;
    }

    /// Makes every replace take `latency` (in tokio time).
    pub fn set_latency(&self, latency: Duration) {
        *self.replace_latency.lock() = latency;
    }

    fn check_id(&self, creds: &RemoteCredentials) -> Result<(), RemoteError> {
        if *self.document_id.lock() == creds.document_id {
            Ok(())
        } else {
            Err(RemoteError::NotFound)
        }
    }
}

#[async_trait]
impl DocumentApi for FakeDocumentApi {
    async fn fetch_document(&self, creds: &RemoteCredentials) -> Result<Document, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.fetch_failure.lock() {
            return Err(failure.to_error());
        }
        self.check_id(creds)?;
        Ok(self.document())
    }

    async fn replace_document(
        &self,
        creds: &RemoteCredentials,
        doc: &Document,
    ) -> Result<(), RemoteError> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight_replaces.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_replaces.fetch_max(now, Ordering::SeqCst);

        let latency = *self.replace_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let failure = *self.replace_failure.lock();
        let result = match failure {
            Some(failure) => Err(failure.to_error()),
            None => self.check_id(creds).map(|()| {
                *self.document.lock() = doc.clone();
            }),
        };
        self.in_flight_replaces.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn create_document(&self, _token: &str) -> Result<String, RemoteError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(failure) = *self.create_failure.lock() {
            return Err(failure.to_error());
        }
        let id = format!("created-{n}");
        *self.document_id.lock() = id.clone();
        *self.document.lock() = Document::new();
        Ok(id)
    }
}
