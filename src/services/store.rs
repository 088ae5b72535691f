//! Per-repository persistence of feature-managed settings.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::ServiceError;

/// Key/value storage of JSON documents scoped to a repository.
pub trait SettingsStore: Send + Sync {
    /// Stored document for `key`, or `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the backing storage cannot be read
    /// or holds malformed data.
    fn load(&self, repository: &str, key: &str) -> Result<Option<Value>, ServiceError>;

    /// Replace the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if the document cannot be written.
    fn save(&self, repository: &str, key: &str, value: &Value) -> Result<(), ServiceError>;
}

/// One pretty-printed JSON file per repository and key:
/// `<root>/<owner>/<name>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, repository: &str, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in repository.split('/').filter(|p| !p.is_empty() && *p != "..") {
            path.push(part);
        }
        path.join(format!("{key}.json"))
    }
}

fn store_error(path: &Path, message: impl std::fmt::Display) -> ServiceError {
    ServiceError::Store {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

impl SettingsStore for FileStore {
    fn load(&self, repository: &str, key: &str) -> Result<Option<Value>, ServiceError> {
        let path = self.path_for(repository, key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| store_error(&path, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| store_error(&path, format!("malformed JSON: {e}")))
    }

    fn save(&self, repository: &str, key: &str, value: &Value) -> Result<(), ServiceError> {
        let path = self.path_for(repository, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| store_error(parent, e))?;
        }
        let content = serde_json::to_string_pretty(value).map_err(|e| store_error(&path, e))?;
        fs::write(&path, content + "\n").map_err(|e| store_error(&path, e))
    }
}

/// Volatile store kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<(String, String), Value>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.lock().map_or(0, |d| d.len())
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, repository: &str, key: &str) -> Result<Option<Value>, ServiceError> {
        let documents = self.documents.lock().map_err(|_| ServiceError::Store {
            path: format!("memory:{repository}/{key}"),
            message: "store lock poisoned".to_string(),
        })?;
        Ok(documents
            .get(&(repository.to_string(), key.to_string()))
            .cloned())
    }

    fn save(&self, repository: &str, key: &str, value: &Value) -> Result<(), ServiceError> {
        let mut documents = self.documents.lock().map_err(|_| ServiceError::Store {
            path: format!("memory:{repository}/{key}"),
            message: "store lock poisoned".to_string(),
        })?;
        documents.insert((repository.to_string(), key.to_string()), value.clone());
        Ok(())
    }
}
