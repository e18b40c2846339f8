//! File-backed [`LocalStorage`]: the whole area lives in one JSON object file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::LocalStorage;
use crate::error::LocalStorageError;

/// Storage area persisted as a single JSON file of string values.
///
/// Every write rewrites the file through a sibling temp file and a rename, so
/// a crash mid-write leaves the previous contents in place. A file that does
/// not parse reads as an empty area and is replaced by the next write.
#[derive(Debug)]
pub struct FileLocalStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

type Items = BTreeMap<String, String>;

impl FileLocalStorage {
    /// Opens (or lazily creates) the area stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LocalStorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn read_items(&self) -> Result<Items, LocalStorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Items::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Items::new());
        }
        match serde_json::from_str(&raw) {
            Ok(items) => Ok(items),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "local storage file is corrupt; treating it as empty"
                );
                Ok(Items::new())
            }
        }
    }

    fn write_items(&self, items: &Items) -> Result<(), LocalStorageError> {
        let raw = serde_json::to_string(items)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStorage for FileLocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_items()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStorageError> {
        let _guard = self.lock.lock();
        let mut items = self.read_items()?;
        items.insert(key.to_string(), value.to_string());
        self.write_items(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), LocalStorageError> {
        let _guard = self.lock.lock();
        let mut items = self.read_items()?;
        items.remove(key);
        self.write_items(&items)
    }

    fn keys(&self) -> Result<Vec<String>, LocalStorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_items()?.into_keys().collect())
    }
}
