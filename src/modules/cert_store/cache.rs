//! In-process cache of parsed certificate records.
//!
//! Keyed by id and shared by all in-flight handshakes. Invalidation is
//! wholesale: any store mutation drops the entire cache rather than chasing
//! individual entries. Correctness over efficiency.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::record::CertificateRecord;

/// Concurrent cache of parsed records, safe to read during flushes.
#[derive(Default)]
pub struct CertificateCache {
    entries: DashMap<String, Arc<CertificateRecord>>,
}

impl CertificateCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a parsed record by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<CertificateRecord>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Insert a parsed record.
    pub fn insert(&self, record: Arc<CertificateRecord>) {
        self.entries.insert(record.id().to_string(), record);
    }

    /// Drop every cached entry.
    pub fn flush(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(entries = dropped, "Certificate cache flushed");
    }

    /// Number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Arc<CertificateRecord> {
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        Arc::new(CertificateRecord::parse(cert.pem().as_bytes(), None).unwrap())
    }

    #[test]
    fn test_cache_insert_get_flush() {
        let cache = CertificateCache::new();
        let record = record();
        let id = record.id().to_string();

        assert!(cache.get(&id).is_none());
        cache.insert(Arc::clone(&record));
        assert!(cache.get(&id).is_some());
        assert_eq!(cache.len(), 1);

        cache.flush();
        assert!(cache.get(&id).is_none());
        assert!(cache.is_empty());
    }
}
