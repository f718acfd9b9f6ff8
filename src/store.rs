//! Document store over a filesystem root.
//!
//! Documents are addressed by slash-separated paths relative to the data
//! root. Saves are atomic (write to a sibling temp file, then rename) so a
//! crash mid-write never leaves a torn user or token document behind.
//! "Not found" is a distinct error kind so loaders can translate it into a
//! default value instead of failing.

use serde::{Serialize, de::DeserializeOwned};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid document path: {0}")]
    InvalidPath(String),
    #[error("invalid json in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when the error only means the document does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative document path under the root.
    ///
    /// Rejects absolute paths and any `..` component; the `/private/*` route
    /// feeds client-controlled suffixes straight into the store.
    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StoreError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }

    /// Load and parse a JSON document.
    pub async fn load<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let bytes = self.load_raw(path).await?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: path.to_string(),
            source,
        })
    }

    /// Load a JSON document, substituting `default` when it does not exist.
    pub async fn load_or<T: DeserializeOwned>(
        &self,
        path: &str,
        default: T,
    ) -> Result<T, StoreError> {
        match self.load(path).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_not_found() => Ok(default),
            Err(err) => Err(err),
        }
    }

    /// Load a document's raw bytes.
    pub async fn load_raw(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let target = self.resolve(path)?;
        match fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Load a UTF-8 text document (rule and group files).
    pub async fn load_text(&self, path: &str) -> Result<String, StoreError> {
        let bytes = self.load_raw(path).await?;
        String::from_utf8(bytes)
            .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err).into())
    }

    /// Atomically replace a JSON document, creating parent directories.
    pub async fn save<T: Serialize>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: path.to_string(),
            source,
        })?;
        self.save_raw(path, &json).await
    }

    /// Atomically replace a document's raw bytes.
    pub async fn save_raw(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Rename within the same directory keeps the replace atomic.
        let temp = target.with_extension("tmp");
        fs::write(&temp, bytes).await?;
        fs::rename(&temp, &target).await?;
        Ok(())
    }

    /// Remove a document; an absent file is a no-op.
    pub async fn drop_document(&self, path: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// True when the document exists as a file.
    pub async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(target) => fs::metadata(&target)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Breadth-first enumeration of `(relative path, is_file)` under `prefix`.
    ///
    /// A missing prefix directory yields an empty listing.
    pub async fn walk(&self, prefix: &str) -> Result<Vec<(String, bool)>, StoreError> {
        let start = self.resolve(prefix)?;
        let mut entries = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(dir) = queue.pop_front() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = reader.next_entry().await? {
                let path = entry.path();
                let is_file = entry.file_type().await?.is_file();
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    entries.push((relative.to_string_lossy().replace('\\', "/"), is_file));
                }
                if !is_file {
                    queue.push_back(path);
                }
            }
        }
        entries.sort();
        Ok(entries)
    }
}
