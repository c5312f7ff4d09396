//! Content-addressed certificate store.

use std::sync::Arc;

use tracing::{debug, info};

use super::backend::StorageBackend;
use super::cache::CertificateCache;
use super::error::{CertStoreError, CertStoreResult};
use super::record::{CertMeta, CertificateRecord};

/// Certificate store: content-addressed persistence of PEM material plus a
/// parsed-record cache shared by every in-flight handshake.
///
/// Records are immutable once stored. Any mutation (add/delete) flushes the
/// whole cache so no connection can observe a stale trust decision.
pub struct CertificateStore {
    backend: Box<dyn StorageBackend>,
    cache: CertificateCache,
}

impl CertificateStore {
    /// Create a store over the given backend.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            cache: CertificateCache::new(),
        }
    }

    /// Insert PEM material and return its id.
    ///
    /// The id is the hex SHA-256 of the leaf certificate DER, or of the
    /// SubjectPublicKeyInfo DER for bare-key input; an explicit id overrides
    /// either. Re-inserting identical content under the same derived id is
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CertStoreError::MalformedPem`] for unusable input, or a
    /// backend error if persistence fails.
    pub fn add(&self, pem: &[u8], explicit_id: Option<&str>) -> CertStoreResult<String> {
        let record = CertificateRecord::parse(pem, explicit_id)?;
        let id = record.id().to_string();

        self.backend.set(&id, pem)?;
        self.cache.flush();

        info!(id = %id, has_private = record.has_private(), "Certificate added");
        Ok(id)
    }

    /// Remove a certificate by id.
    ///
    /// # Errors
    ///
    /// Returns [`CertStoreError::NotFound`] when no entry exists.
    pub fn delete(&self, id: &str) -> CertStoreResult<()> {
        if !self.backend.delete(id)? {
            return Err(CertStoreError::NotFound { id: id.to_string() });
        }
        self.cache.flush();
        info!(id = %id, "Certificate deleted");
        Ok(())
    }

    /// Fetch the parsed record for an id, via the cache.
    ///
    /// # Errors
    ///
    /// Returns [`CertStoreError::NotFound`] when no entry exists.
    pub fn get(&self, id: &str) -> CertStoreResult<Arc<CertificateRecord>> {
        if let Some(record) = self.cache.get(id) {
            return Ok(record);
        }

        let pem = self
            .backend
            .get(id)?
            .ok_or_else(|| CertStoreError::NotFound { id: id.to_string() })?;

        let record = Arc::new(CertificateRecord::parse(&pem, Some(id))?);
        self.cache.insert(Arc::clone(&record));
        debug!(id = %id, "Certificate parsed into cache");
        Ok(record)
    }

    /// List all stored ids, sorted.
    ///
    /// An empty store yields an empty vector; the admin layer renders that
    /// as an explicit null set.
    ///
    /// # Errors
    ///
    /// Returns a backend error if listing fails.
    pub fn list(&self) -> CertStoreResult<Vec<String>> {
        let mut ids = self.backend.keys()?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Fetch summaries for a set of ids, preserving the requested order.
    /// Ids that do not resolve are skipped.
    #[must_use]
    pub fn get_meta(&self, ids: &[&str]) -> Vec<CertMeta> {
        ids.iter()
            .filter_map(|id| self.get(id).ok())
            .map(|record| record.meta())
            .collect()
    }

    /// Drop every cached parsed record.
    ///
    /// Safe to call while handshakes are reading; they either finish with
    /// the record they already hold or re-parse from the backend.
    pub fn flush_cache(&self) {
        self.cache.flush();
    }
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("cached", &self.cache.len())
            .finish()
    }
}
