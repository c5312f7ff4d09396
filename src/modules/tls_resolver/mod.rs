//! TLS Resolver Module
//!
//! Builds and serves the listener-side TLS configuration. It supports:
//! - SNI-aware server identity selection (exact, wildcard, default)
//! - Per-hello server config selection so the control endpoint's stricter
//!   client-auth policy multiplexes with proxied traffic on one listener
//! - Soft (request-not-require) client auth with enforcement deferred to
//!   the routing layer
//! - Cipher suite and minimum protocol version policy
//! - Atomic generation publishing: rebuilds never expose partial state

mod cipher;
mod client_auth;
mod error;
mod resolver;
mod state;

pub use cipher::CipherPolicy;
pub use client_auth::{ControlClientVerifier, DeferredClientVerifier};
pub use error::{TlsResolverError, TlsResolverResult};
pub use resolver::ServerIdentityResolver;
pub use state::{TlsConfigResolver, TlsState};
