//! Failover-aware HTTP transport for talking to OCI/Docker registries.
//!
//! Handles the HTTPS → insecure-HTTPS → plain-HTTP failover ladder, retries
//! for idempotent methods, bounded redirect following, and stripping
//! `Authorization` on downgrade to cleartext.

mod error;
mod request;
mod tier;
mod transport;

pub use error::{Error, Result};
pub use request::{Method, Request, Response};
pub use tier::{FailoverHistory, Tier};
pub use transport::{Transport, TransportConfig, WWW_AUTHENTICATE};
