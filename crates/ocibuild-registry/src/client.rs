//! The wire-level registry client.

use crate::auth::{basic_auth_header, parse_challenge, Challenge, CredentialProvider};
use crate::error::{Error, Result};
use crate::manifest::{RawManifest, ACCEPTED_MANIFEST_MEDIA_TYPES};
use ocibuild_digest::{BlobDescriptor, Blob, Digest};
use ocibuild_events::{AllocationRegistry, Event, EventSender};
use ocibuild_transport::{Method, Request, Transport};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Progress/log sink handed to operations that move blob bytes over the
/// wire, matching the pattern the daemon load sink drives already.
pub type ProgressEvents = Option<(Arc<EventSender>, Arc<AllocationRegistry>)>;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";
const WWW_AUTHENTICATE: &str = "www-authenticate";

/// The outcome of a [`RegistryClient::push_blob`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlobPushOutcome {
    /// The blob was mounted from another repository or already present;
    /// no bytes were uploaded.
    Skipped,
    /// The blob was uploaded in full.
    Pushed,
}

/// A client bound to one `(registry, repository)` pair, holding whatever
/// `Authorization` value the last successful challenge resolution produced.
pub struct RegistryClient {
    transport: Arc<Transport>,
    credentials: Arc<dyn CredentialProvider>,
    registry: String,
    repository: String,
    authorization: RwLock<Option<String>>,
}

impl RegistryClient {
    /// Build a client for `registry`/`repository` using `transport` for all
    /// requests and `credentials` to answer authentication challenges.
    #[must_use]
    pub fn new(
        transport: Arc<Transport>,
        credentials: Arc<dyn CredentialProvider>,
        registry: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            registry: registry.into(),
            repository: repository.into(),
            authorization: RwLock::new(None),
        }
    }

    fn base_url(&self) -> String {
        format!("https://{}", self.registry)
    }

    fn v2_url(&self, path: &str) -> Result<url::Url> {
        let url = format!("{}/v2/{}", self.base_url(), path);
        url::Url::parse(&url).map_err(|e| Error::BadChallenge(e.to_string()))
    }

    /// Discover the registry's authentication requirements for a pull
    /// (read) operation and resolve an `Authorization` value.
    pub async fn authenticate_pull(&self) -> Result<()> {
        self.authenticate(&format!("repository:{}:pull", self.repository))
            .await
    }

    /// Discover the registry's authentication requirements for a push
    /// (write) operation and resolve an `Authorization` value.
    pub async fn authenticate_push(&self) -> Result<()> {
        self.authenticate(&format!("repository:{}:pull,push", self.repository))
            .await
    }

    async fn authenticate(&self, scope: &str) -> Result<()> {
        let probe_url = self.v2_url("")?;
        let response = self
            .transport
            .execute(Request::new(Method::Get, probe_url))
            .await?;

        if response.status() != 401 {
            *self.authorization.write().await = None;
            return Ok(());
        }

        let header = response
            .header(WWW_AUTHENTICATE)
            .ok_or_else(|| Error::BadChallenge("401 with no WWW-Authenticate header".to_string()))?
            .to_string();
        let challenge = parse_challenge(&header)?;
        let authorization = self.resolve_challenge(challenge, scope).await?;
        *self.authorization.write().await = authorization;
        Ok(())
    }

    async fn resolve_challenge(&self, challenge: Challenge, scope: &str) -> Result<Option<String>> {
        let credentials = self.credentials.credentials_for(&self.registry).await;
        match challenge {
            Challenge::Basic => Ok(credentials.as_ref().map(basic_auth_header)),
            Challenge::Bearer {
                realm,
                service,
                scope: challenge_scope,
            } => {
                let mut url = url::Url::parse(&realm)
                    .map_err(|e| Error::BadChallenge(format!("bad realm {realm:?}: {e}")))?;
                {
                    let mut query = url.query_pairs_mut();
                    if let Some(service) = &service {
                        query.append_pair("service", service);
                    }
                    query.append_pair("scope", challenge_scope.as_deref().unwrap_or(scope));
                }
                let mut request = Request::new(Method::Get, url);
                if let Some(credentials) = &credentials {
                    request = request.with_header("Authorization", basic_auth_header(credentials));
                }
                let response = self.transport.execute(request).await?;
                if response.status() != 200 {
                    return Err(Error::authentication_failed(
                        &self.registry,
                        format!("token endpoint returned {}", response.status()),
                    ));
                }
                let body = response
                    .inner
                    .bytes()
                    .await
                    .map_err(|e| Error::authentication_failed(&self.registry, e.to_string()))?;
                let token: TokenResponse = serde_json::from_slice(&body)
                    .map_err(|e| Error::json("bearer token response", e))?;
                let token = token.token.or(token.access_token).ok_or_else(|| {
                    Error::authentication_failed(&self.registry, "token response had no token field")
                })?;
                Ok(Some(format!("Bearer {token}")))
            }
        }
    }

    async fn authorized_request(&self, method: Method, url: url::Url) -> Request {
        let mut request = Request::new(method, url);
        if let Some(authorization) = self.authorization.read().await.clone() {
            request = request.with_header("Authorization", authorization);
        }
        request
    }

    async fn reauth_scope(&self) -> String {
        format!("repository:{}:pull,push", self.repository)
    }

    /// Pull a manifest by tag or digest.
    pub async fn pull_manifest(&self, reference: &str) -> Result<RawManifest> {
        let url = self.v2_url(&format!("{}/manifests/{reference}", self.repository))?;
        let build_request = || async {
            let mut request = self.authorized_request(Method::Get, url.clone()).await;
            for media_type in ACCEPTED_MANIFEST_MEDIA_TYPES {
                request = request.with_header("Accept", (*media_type).to_string());
            }
            request
        };

        let response = self
            .send_with_reauth(build_request().await, build_request)
            .await?;

        if response.status() != 200 {
            return Err(self.translate_error(response, "pull manifest").await);
        }

        let media_type = response
            .header("content-type")
            .unwrap_or(ACCEPTED_MANIFEST_MEDIA_TYPES[0])
            .to_string();
        let declared_digest = response.header(DOCKER_CONTENT_DIGEST).map(str::to_string);
        let bytes = response
            .inner
            .bytes()
            .await
            .map_err(|e| ocibuild_transport::Error::Io {
                operation: "read manifest body".to_string(),
                source: e,
            })?
            .to_vec();

        let computed = Digest::of_bytes(&bytes);
        let digest = match declared_digest {
            Some(declared) => {
                let declared = Digest::from_canonical(&declared)?;
                if declared != computed {
                    return Err(Error::DigestMismatch {
                        expected: declared.canonical().to_string(),
                        actual: computed.canonical().to_string(),
                    });
                }
                declared
            }
            None => computed,
        };

        Ok(RawManifest {
            media_type,
            bytes,
            digest,
        })
    }

    /// Push a manifest under `tag`, returning the digest the registry
    /// assigned it.
    pub async fn push_manifest(&self, manifest: &RawManifest, tag: &str) -> Result<Digest> {
        let url = self.v2_url(&format!("{}/manifests/{tag}", self.repository))?;
        let body: Arc<dyn Blob> = Arc::new(ocibuild_digest::BytesBlob::new(manifest.bytes.clone()));
        let build_request = || async {
            self.authorized_request(Method::Put, url.clone())
                .await
                .with_header("Content-Type", manifest.media_type.clone())
                .with_body(Arc::clone(&body))
        };

        let response = self
            .send_with_reauth(build_request().await, build_request)
            .await?;
        match response.status() {
            201 => Ok(response
                .header(DOCKER_CONTENT_DIGEST)
                .map(Digest::from_canonical)
                .transpose()?
                .unwrap_or_else(|| manifest.digest.clone())),
            _ => Err(self.translate_error(response, "push manifest").await),
        }
    }

    /// Check whether `digest` already exists in the repository.
    pub async fn check_blob(&self, digest: &Digest) -> Result<Option<BlobDescriptor>> {
        let url = self.v2_url(&format!("{}/blobs/{}", self.repository, digest.canonical()))?;
        let build_request = || async { self.authorized_request(Method::Head, url.clone()).await };
        let response = self
            .send_with_reauth(build_request().await, build_request)
            .await?;
        match response.status() {
            200 => {
                let size = response
                    .header("content-length")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                Ok(Some(BlobDescriptor::new(size, digest.clone())))
            }
            404 => Ok(None),
            status => Err(Error::UnexpectedStatus {
                operation: "check blob".to_string(),
                status,
            }),
        }
    }

    /// Push `blob` as `digest`, optionally mounting it from
    /// `source_repository` when the registries are the same host. Follows
    /// the mount → chunked PATCH → commit PUT state machine.
    pub async fn push_blob(
        &self,
        digest: &Digest,
        blob: Arc<dyn Blob>,
        source_repository: Option<&str>,
        events: ProgressEvents,
    ) -> Result<BlobPushOutcome> {
        let mut path = format!(
            "{}/blobs/uploads/?mount={}",
            self.repository,
            digest.canonical()
        );
        if let Some(source) = source_repository {
            path.push_str(&format!("&from={source}"));
        }
        let url = self.v2_url(&path)?;
        let build_initiate = || async { self.authorized_request(Method::Post, url.clone()).await };
        let response = self
            .send_with_reauth(build_initiate().await, build_initiate)
            .await?;

        match response.status() {
            201 => {
                if let Some((sender, allocations)) = &events {
                    allocations.open(digest.canonical(), None);
                    let _ = sender.send(Event::log(
                        ocibuild_events::LogLevel::Info,
                        format!("blob {} already exists, mounted", digest.canonical()),
                    ));
                }
                return Ok(BlobPushOutcome::Skipped);
            }
            202 => {}
            status => {
                return Err(Error::UnexpectedStatus {
                    operation: "initiate blob upload".to_string(),
                    status,
                })
            }
        }

        let mut location = response
            .header("location")
            .ok_or_else(|| Error::missing_location("initiate blob upload"))?
            .to_string();

        let mut buf = Vec::new();
        blob.write_to(&mut buf).await?;
        let size = buf.len() as u64;

        let patch_url = self.resolve_location(&location)?;
        let patch_body: Arc<dyn Blob> = Arc::new(ocibuild_digest::BytesBlob::new(buf));
        let build_patch = || async {
            self.authorized_request(Method::Patch, patch_url.clone())
                .await
                .with_header("Content-Type", "application/octet-stream")
                .with_body(Arc::clone(&patch_body))
        };
        let patch_response = self
            .send_with_reauth(build_patch().await, build_patch)
            .await?;
        if patch_response.status() != 202 {
            return Err(Error::UnexpectedStatus {
                operation: "patch blob upload".to_string(),
                status: patch_response.status(),
            });
        }
        location = patch_response
            .header("location")
            .ok_or_else(|| Error::missing_location("patch blob upload"))?
            .to_string();

        let mut commit_url = self.resolve_location(&location)?;
        commit_url
            .query_pairs_mut()
            .append_pair("digest", digest.canonical());
        let build_commit = || async { self.authorized_request(Method::Put, commit_url.clone()).await };
        let commit_response = self
            .send_with_reauth(build_commit().await, build_commit)
            .await?;
        if commit_response.status() != 201 {
            return Err(Error::UnexpectedStatus {
                operation: "commit blob upload".to_string(),
                status: commit_response.status(),
            });
        }

        if let Some((sender, allocations)) = &events {
            allocations.open(digest.canonical(), Some(size));
            allocations.advance(digest.canonical(), size);
            let _ = sender.send(Event::progress(digest.canonical(), size));
        }

        Ok(BlobPushOutcome::Pushed)
    }

    /// Pull a blob, streaming it into `sink` while verifying its digest.
    pub async fn pull_blob(
        &self,
        digest: &Digest,
        sink: &mut Vec<u8>,
        events: ProgressEvents,
    ) -> Result<BlobDescriptor> {
        let url = self.v2_url(&format!("{}/blobs/{}", self.repository, digest.canonical()))?;
        let build_request = || async { self.authorized_request(Method::Get, url.clone()).await };
        let response = self
            .send_with_reauth(build_request().await, build_request)
            .await?;
        if response.status() != 200 {
            return Err(self.translate_error(response, "pull blob").await);
        }
        let content_length = response
            .header("content-length")
            .and_then(|v| v.parse::<u64>().ok());
        if let Some((_, allocations)) = &events {
            allocations.open(digest.canonical(), content_length);
        }
        let bytes = response
            .inner
            .bytes()
            .await
            .map_err(|e| ocibuild_transport::Error::Io {
                operation: "read blob body".to_string(),
                source: e,
            })?;
        sink.extend_from_slice(&bytes);

        let observed = Digest::of_bytes(sink);
        if &observed != digest {
            return Err(Error::DigestMismatch {
                expected: digest.canonical().to_string(),
                actual: observed.canonical().to_string(),
            });
        }

        if let Some((sender, allocations)) = &events {
            allocations.advance(digest.canonical(), bytes.len() as u64);
            let _ = sender.send(Event::progress(digest.canonical(), bytes.len() as u64));
        }

        Ok(BlobDescriptor::new(sink.len() as u64, digest.clone()))
    }

    fn resolve_location(&self, location: &str) -> Result<url::Url> {
        match url::Url::parse(location) {
            Ok(url) => Ok(url),
            Err(_) => url::Url::parse(&self.base_url())
                .and_then(|base| base.join(location))
                .map_err(|e| Error::BadChallenge(format!("bad Location {location:?}: {e}"))),
        }
    }

    async fn send_with_reauth<F, Fut>(&self, request: Request, rebuild: F) -> Result<ocibuild_transport::Response>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Request>,
    {
        let response = self.transport.execute(request).await?;
        if response.status() != 401 {
            return Ok(response);
        }
        if response.credentials_stripped {
            return Err(Error::CredentialsNotSent {
                registry: self.registry.clone(),
            });
        }
        let header = response
            .header(WWW_AUTHENTICATE)
            .ok_or_else(|| Error::BadChallenge("401 with no WWW-Authenticate header".to_string()))?
            .to_string();
        let challenge = parse_challenge(&header)?;
        let scope = self.reauth_scope().await;
        let authorization = self.resolve_challenge(challenge, &scope).await?;
        *self.authorization.write().await = authorization;
        self.transport
            .execute(rebuild().await)
            .await
            .map_err(Error::from)
    }

    async fn translate_error(&self, response: ocibuild_transport::Response, operation: &str) -> Error {
        let status = response.status();
        match response.inner.bytes().await {
            Ok(body) => match serde_json::from_slice::<RegistryErrorEnvelope>(&body) {
                Ok(envelope) if !envelope.errors.is_empty() => {
                    let first = &envelope.errors[0];
                    Error::Api {
                        code: first.code.clone(),
                        message: first.message.clone(),
                    }
                }
                _ => Error::UnexpectedStatus {
                    operation: operation.to_string(),
                    status,
                },
            },
            Err(_) => Error::UnexpectedStatus {
                operation: operation.to_string(),
                status,
            },
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct RegistryErrorEnvelope {
    #[serde(default)]
    errors: Vec<RegistryErrorDetail>,
}

#[derive(serde::Deserialize)]
struct RegistryErrorDetail {
    code: String,
    message: String,
}

