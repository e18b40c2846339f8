//! Configuration types for the storage adapter.

use std::time::Duration;

/// Storage key holding the shared document in the local storage area.
pub const SHARED_DOCUMENT_KEY: &str = "meetup_shared_db_v2";
/// Storage key holding the remote access token.
pub const REMOTE_TOKEN_KEY: &str = "meetup_github_token";
/// Storage key holding the remote document identifier.
pub const REMOTE_DOCUMENT_ID_KEY: &str = "meetup_gist_id";

/// Top-level adapter configuration.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    /// Reserved keys in the local storage area.
    pub keys: StorageKeys,
    /// Write coalescing and cache settings for the remote backend.
    pub sync: SyncConfig,
    /// Remote document API settings.
    pub remote: RemoteApiConfig,
}

/// Reserved keys in the local storage area.
#[derive(Debug, Clone)]
pub struct StorageKeys {
    /// Key of the shared logical document used by the local fallback.
    pub shared_document: String,
    /// Key of the persisted remote access token.
    pub remote_token: String,
    /// Key of the persisted remote document identifier.
    pub remote_document_id: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            shared_document: SHARED_DOCUMENT_KEY.to_string(),
            remote_token: REMOTE_TOKEN_KEY.to_string(),
            remote_document_id: REMOTE_DOCUMENT_ID_KEY.to_string(),
        }
    }
}

/// Write coalescing, caching, and retry settings for the remote backend.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Debounce delay: a flush fires this long after the latest pending change.
    pub batch_delay: Duration,
    /// How long a fetched or flushed document stays valid as a cache entry.
    pub cache_ttl: Duration,
    /// Upper bound on the delay before retrying a failed flush.
    pub max_retry_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(30),
            max_retry_backoff: Duration::from_secs(300),
        }
    }
}

/// Remote document API settings.
#[derive(Debug, Clone)]
pub struct RemoteApiConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Name of the file inside the remote document that holds the JSON blob.
    pub file_name: String,
    /// Description given to newly created documents.
    pub description: String,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            file_name: "database.json".to_string(),
            description: "MeetUp Demo Day - Database Storage".to_string(),
            user_agent: concat!("demoday-storage/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}
