//! JSON File Store
//!
//! All keys live in one JSON object on disk. Writes go to a sibling temp
//! file first and are renamed into place, so a crash mid-write leaves the
//! previous document intact.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::application::ports::{LocalStore, StoreError};

/// Local store backed by a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(io_error(&self.path, &e)),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&text) {
            Ok(Value::Object(entries)) => Ok(entries),
            Ok(other) => Err(StoreError::Corrupt {
                message: format!("{} holds {other}, expected an object", self.path.display()),
            }),
            Err(e) => Err(StoreError::Corrupt {
                message: format!("{}: {e}", self.path.display()),
            }),
        }
    }

    fn write_document(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }

        let body = serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Io {
            message: e.to_string(),
        })?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, body).map_err(|e| io_error(&staging, &e))?;
        fs::rename(&staging, &self.path).map_err(|e| io_error(&self.path, &e))
    }
}

impl LocalStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_document()?.remove(key))
    }

    fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();

        // A corrupt document is replaced rather than blocking every save.
        let mut entries = match self.read_document() {
            Ok(entries) => entries,
            Err(StoreError::Corrupt { message }) => {
                tracing::warn!(error = %message, "Discarding corrupt local store");
                Map::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(key.to_string(), value.clone());
        self.write_document(&entries)?;

        tracing::debug!(key, path = %self.path.display(), "Saved local entry");
        Ok(())
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> StoreError {
    StoreError::Io {
        message: format!("{}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("guest.json"));

        assert_eq!(store.load("desk.preferences"), Ok(None));
    }

    #[test]
    fn save_creates_parents_and_keeps_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/guest.json");
        let store = JsonFileStore::new(&path);

        store.save("a", &json!({ "detailSymbol": "NVDA" })).unwrap();
        store.save("b", &json!([1, 2, 3])).unwrap();
        store.save("a", &json!({ "detailSymbol": "AAPL" })).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load("a"), Ok(Some(json!({ "detailSymbol": "AAPL" }))));
        assert_eq!(reopened.load("b"), Ok(Some(json!([1, 2, 3]))));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_reports_then_recovers_on_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guest.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.load("a"), Err(StoreError::Corrupt { .. })));

        store.save("a", &json!(true)).unwrap();
        assert_eq!(store.load("a"), Ok(Some(json!(true))));
    }

    #[test]
    fn non_object_document_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guest.json");
        fs::write(&path, "[1,2]").unwrap();

        assert!(matches!(
            JsonFileStore::new(&path).load("a"),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
