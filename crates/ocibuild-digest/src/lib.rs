//! SHA-256 digest and blob primitives shared by every other `ocibuild` crate.
//!
//! This crate has no internal dependencies; it is the leaf of the workspace
//! dependency graph.

mod blob;
mod digest;
mod error;

pub use blob::{compute_digest, Blob, BytesBlob, CallbackBlob, FileBlob, JsonBlob};
pub use digest::{BlobDescriptor, Digest};
pub use error::{Error, Result};
