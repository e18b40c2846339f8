//! Machine-local storage: the fallback backend and the credential area.
//!
//! Two layers:
//!
//! - **Area** ([`LocalStorage`]): a flat string-to-string store scoped to one
//!   machine profile, shared by every role running there. Implemented in
//!   memory ([`MemoryLocalStorage`]) and as a JSON file ([`FileLocalStorage`]).
//! - **Documents on top of an area**: [`SharedDocumentStore`] keeps the whole
//!   logical document under one reserved key; [`CredentialStore`] keeps the
//!   remote access token and document id under two more.

mod credentials;
mod file;
mod memory;
mod shared;

pub use credentials::CredentialStore;
pub use file::FileLocalStorage;
pub use memory::MemoryLocalStorage;
pub use shared::SharedDocumentStore;

use crate::error::LocalStorageError;

/// Flat string key-value area with synchronous semantics.
///
/// Used as `Arc<dyn LocalStorage>`.
pub trait LocalStorage: Send + Sync + 'static {
    /// Returns the stored string, or `None` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be written or is full.
    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStorageError>;

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be written.
    fn remove_item(&self, key: &str) -> Result<(), LocalStorageError>;

    /// Lists every key in the area, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the area cannot be read.
    fn keys(&self) -> Result<Vec<String>, LocalStorageError>;
}
