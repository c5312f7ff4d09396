//! Upstream TLS transports: outbound trust, client identity, public key
//! pinning, and forward-proxy tunnelling.
//!
//! Trust for an outbound connection is decided per (route, target host):
//! a pinned public key set replaces chain verification outright, the
//! skip-verify flag selects an accept-all verifier, and otherwise the
//! bundled web PKI roots apply. Pins hold through forward proxies, plain
//! or TLS, since the upstream handshake runs end to end inside the
//! CONNECT tunnel.

mod error;
mod pinning;
mod transport;

pub use error::{UpstreamError, UpstreamResult};
pub use pinning::{
    binding_for_host, pins_for_host, resolve_pins, InsecureServerVerifier, PinnedKeyVerifier,
};
pub use transport::{UpstreamIo, UpstreamTransport, UpstreamTransportCache};
