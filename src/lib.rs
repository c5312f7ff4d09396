//! # Keel Gateway
//!
//! Certificate store and TLS trust engine for an API gateway reverse
//! proxy: one subsystem answering, for every connection in both
//! directions, "which certificate do we present, and do we trust the
//! peer's".
//!
//! ## Features
//!
//! - Content-addressed certificate store (hex SHA-256 ids) with
//!   in-memory and filesystem backends
//! - Per-SNI server identity selection with exact, wildcard, and
//!   catch-all bindings
//! - Deferred client authentication: the handshake requests a
//!   certificate, per-route allow-lists judge it at request time
//! - A dedicated control endpoint with mandatory, chain-verified
//!   client authentication
//! - Outbound public key pinning that replaces chain verification and
//!   holds through forward proxies
//! - Atomic configuration rebuilds: in-flight handshakes finish on the
//!   generation they started with
//!
//! ## Architecture
//!
//! Runtime trust state is immutable once built. Mutations construct a
//! complete new generation and publish it with a single atomic swap, so
//! handshake callbacks never take a lock. The external HTTP routing
//! layer drives [`modules::mutual_tls`] and [`modules::admin_api`];
//! everything below the request line lives here.

pub mod config;
pub mod modules;
