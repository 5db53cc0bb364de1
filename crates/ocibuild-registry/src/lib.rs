//! Wire-level client for the OCI/Docker Distribution registry API.
//!
//! Speaks the raw HTTP protocol (manifest pull/push, blob check/push/pull,
//! bearer/basic authentication discovery) without opinions about image
//! translation, which is `ocibuild-image`'s job.

mod auth;
mod client;
mod error;
mod manifest;
mod reference;

pub use auth::{
    basic_auth_header, parse_challenge, AnonymousCredentialProvider, Authorization, Challenge,
    CredentialProvider, Credentials,
};
pub use client::{BlobPushOutcome, RegistryClient};
pub use error::{Error, Result};
pub use manifest::{
    RawManifest, ACCEPTED_MANIFEST_MEDIA_TYPES, MEDIA_TYPE_DOCKER_MANIFEST_LIST,
    MEDIA_TYPE_DOCKER_MANIFEST_V1, MEDIA_TYPE_DOCKER_MANIFEST_V2, MEDIA_TYPE_OCI_INDEX,
    MEDIA_TYPE_OCI_MANIFEST,
};
pub use reference::Reference;
