use std::fmt;

use serde::{Deserialize, Serialize};

/// Which storage backend an adapter is routing to.
///
/// Priority order during detection is `Embedded`, then `Remote`, then `Local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Host-provided key-value store, natively per key.
    Embedded,
    /// Remote document store reached over the rate-limited HTTP API.
    Remote,
    /// Shared document in the machine-local storage area.
    Local,
}

impl BackendMode {
    /// Stable lowercase name used in logs, metrics labels, and the CLI.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing description of the active backend, shown by diagnostics screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub mode: BackendMode,
    pub details: String,
    /// Data survives a restart of the process.
    pub is_persistent: bool,
    /// Data is visible to every role (admin and judges) using this backend.
    pub is_shared: bool,
}

impl StorageInfo {
    /// Describes `mode`.
    #[must_use]
    pub fn for_mode(mode: BackendMode) -> Self {
        let details = match mode {
            BackendMode::Embedded => {
                "Data is kept in the host key-value store and shared automatically \
                 between every user and device"
            }
            BackendMode::Remote => {
                "Data is kept in a remote document and synchronized between every \
                 configured user and device"
            }
            BackendMode::Local => {
                "Data is kept locally and shared between every role using this \
                 machine (admin and judges)"
            }
        };
        Self {
            mode,
            details: details.to_string(),
            is_persistent: true,
            is_shared: true,
        }
    }
}

/// Access token and document identifier for the remote document store.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub token: String,
    pub document_id: String,
}

impl RemoteCredentials {
    #[must_use]
    pub fn new(token: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            document_id: document_id.into(),
        }
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("token", &"<redacted>")
            .field("document_id", &self.document_id)
            .finish()
    }
}
