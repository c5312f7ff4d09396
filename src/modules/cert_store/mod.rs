//! Certificate Store Module
//!
//! Content-addressed storage of PEM certificate, key, and public-key
//! material, fronted by a parsed-record cache shared by every in-flight
//! handshake. It supports:
//! - SHA-256 content-addressed ids (certificate DER, or bare public key DER)
//! - Idempotent insertion and hard deletion
//! - Pluggable storage backends (in-memory, file-per-id)
//! - Wholesale cache invalidation on any mutation

mod backend;
mod cache;
mod error;
mod record;
mod store;

pub use backend::{FileBackend, InMemoryBackend, StorageBackend};
pub use cache::CertificateCache;
pub use error::{CertStoreError, CertStoreResult};
pub use record::{hex_sha256, CertMeta, CertificateRecord};
pub use store::CertificateStore;
