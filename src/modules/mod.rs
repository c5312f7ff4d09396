//! # Gateway Modules
//!
//! This module contains the certificate and TLS trust machinery for Keel
//! Gateway.
//!
//! ## Available Modules
//!
//! - [`cert_store`] - Content-addressed certificate storage with pluggable backends
//! - [`tls_resolver`] - Per-SNI server identity and client-auth policy resolution
//! - [`mutual_tls`] - Request-time enforcement of per-route client-certificate allow-lists
//! - [`upstream`] - Outbound TLS transports with public key pinning and proxy tunnelling
//! - [`admin_api`] - Certificate management endpoints for the control plane

pub mod admin_api;
pub mod cert_store;
pub mod mutual_tls;
pub mod tls_resolver;
pub mod upstream;
