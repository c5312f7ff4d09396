//! Storage backends for PEM certificate material.
//!
//! The store itself is backend-agnostic: anything that can persist raw PEM
//! bytes under a string id works. The in-memory backend backs tests and
//! embedded deployments; the file backend keeps one PEM file per id.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use super::error::{CertStoreError, CertStoreResult};

/// A key-value backend holding raw PEM bytes by certificate id.
pub trait StorageBackend: Send + Sync {
    /// Fetch the PEM bytes for an id, or `None` when absent.
    fn get(&self, id: &str) -> CertStoreResult<Option<Vec<u8>>>;

    /// Persist PEM bytes under an id, replacing any existing entry.
    fn set(&self, id: &str, pem: &[u8]) -> CertStoreResult<()>;

    /// Remove an entry. Returns `false` when the id was absent.
    fn delete(&self, id: &str) -> CertStoreResult<bool>;

    /// List all stored ids, in no particular order.
    fn keys(&self) -> CertStoreResult<Vec<String>>;
}

/// In-memory backend.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Create an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, id: &str) -> CertStoreResult<Option<Vec<u8>>> {
        let entries = self.entries.read().map_err(|_| CertStoreError::Backend {
            message: "storage lock poisoned".to_string(),
        })?;
        Ok(entries.get(id).cloned())
    }

    fn set(&self, id: &str, pem: &[u8]) -> CertStoreResult<()> {
        let mut entries = self.entries.write().map_err(|_| CertStoreError::Backend {
            message: "storage lock poisoned".to_string(),
        })?;
        entries.insert(id.to_string(), pem.to_vec());
        Ok(())
    }

    fn delete(&self, id: &str) -> CertStoreResult<bool> {
        let mut entries = self.entries.write().map_err(|_| CertStoreError::Backend {
            message: "storage lock poisoned".to_string(),
        })?;
        Ok(entries.remove(id).is_some())
    }

    fn keys(&self) -> CertStoreResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| CertStoreError::Backend {
            message: "storage lock poisoned".to_string(),
        })?;
        Ok(entries.keys().cloned().collect())
    }
}

/// File backend: one `<id>.pem` file per entry under a base directory.
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a file backend rooted at `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(base_dir: &Path) -> CertStoreResult<Self> {
        fs::create_dir_all(base_dir)?;
        debug!(dir = %base_dir.display(), "Opened certificate file backend");
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: &str) -> CertStoreResult<PathBuf> {
        // Ids are hex digests or caller-chosen names; refuse anything that
        // could escape the base directory.
        if id.is_empty() || id.contains(['/', '\\', '.']) {
            return Err(CertStoreError::Backend {
                message: format!("invalid certificate id '{id}'"),
            });
        }
        Ok(self.base_dir.join(format!("{id}.pem")))
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, id: &str) -> CertStoreResult<Option<Vec<u8>>> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(pem) => Ok(Some(pem)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, id: &str, pem: &[u8]) -> CertStoreResult<()> {
        let path = self.path_for(id)?;
        fs::write(&path, pem)?;
        Ok(())
    }

    fn delete(&self, id: &str) -> CertStoreResult<bool> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> CertStoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".pem") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip() {
        let backend = InMemoryBackend::new();
        backend.set("abc", b"pem bytes").unwrap();
        assert_eq!(backend.get("abc").unwrap().unwrap(), b"pem bytes");
        assert_eq!(backend.keys().unwrap(), vec!["abc".to_string()]);
        assert!(backend.delete("abc").unwrap());
        assert!(!backend.delete("abc").unwrap());
        assert!(backend.get("abc").unwrap().is_none());
    }

    #[test]
    fn test_file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = FileBackend::open(dir.path()).unwrap();
            backend.set("deadbeef", b"pem bytes").unwrap();
        }
        let backend = FileBackend::open(dir.path()).unwrap();
        assert_eq!(backend.get("deadbeef").unwrap().unwrap(), b"pem bytes");
        assert_eq!(backend.keys().unwrap(), vec!["deadbeef".to_string()]);
    }

    #[test]
    fn test_file_backend_rejects_traversal_ids() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(backend.get("../escape").is_err());
        assert!(backend.set("a/b", b"x").is_err());
    }
}
