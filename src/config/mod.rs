//! # Configuration Surface
//!
//! Types describing the TLS policy the gateway's external configuration
//! loader hands to the trust engine: server identities, mutual-TLS
//! allow-lists, pinned public keys, cipher policy, and outbound transport
//! settings, globally and per route.

mod error;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    GatewayTlsConfig, RouteTlsConfig, TransportSettings, TLS12_VERSION_ID, TLS13_VERSION_ID,
};
pub use validation::validate;
