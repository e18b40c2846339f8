//! Remote document backend.
//!
//! - [`DocumentApi`]: whole-document read, replace, and create against a
//!   remote document service. [`GistClient`] is the HTTP implementation.
//! - [`WriteCoalescer`]: the cache, pending change queue, debounce timer, and
//!   write lock that keep the rate-limited API usable under bursts of writes.

mod coalescer;
mod gist;

pub use coalescer::{FlushOutcome, SyncStatus, WriteCoalescer};
pub use gist::GistClient;

use async_trait::async_trait;
use demoday_core::{Document, RemoteCredentials};

use crate::error::RemoteError;

/// Whole-document access to the remote document service.
///
/// Stateless with respect to credentials: every call carries them. Used as
/// `Arc<dyn DocumentApi>`.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Read the whole logical document.
    ///
    /// A document without the data file, or with empty content, is an empty
    /// document.
    async fn fetch_document(&self, creds: &RemoteCredentials) -> Result<Document, RemoteError>;

    /// Replace the whole logical document.
    async fn replace_document(
        &self,
        creds: &RemoteCredentials,
        doc: &Document,
    ) -> Result<(), RemoteError>;

    /// Create a new remote document seeded with an empty logical document.
    ///
    /// Returns the new document's identifier.
    async fn create_document(&self, token: &str) -> Result<String, RemoteError>;
}
