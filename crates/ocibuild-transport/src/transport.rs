//! The failover-aware, retrying HTTP transport.

use crate::error::{Error, Result};
use crate::request::{Request, Response};
use crate::tier::{FailoverHistory, Tier};
use reqwest::header::{HeaderName, HeaderValue};
use std::str::FromStr;
use std::time::Duration;

const MAX_REDIRECTS: usize = 10;
const DEFAULT_RETRY_BUDGET: Duration = Duration::from_secs(30);

/// Configuration for constructing a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Per-request connect/read timeout.
    pub timeout: Duration,
    /// Total wall-clock budget for retrying a single logical request.
    pub retry_budget: Duration,
    /// Disables the insecure-HTTPS and plain-HTTP ladder tiers entirely.
    pub strict: bool,
    /// `User-Agent` header value sent with every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_budget: DEFAULT_RETRY_BUDGET,
            strict: false,
            user_agent: concat!("ocibuild/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A process-wide, thread-safe HTTP client implementing the failover ladder,
/// idempotent-method retries, bounded redirect following, and
/// Authorization-stripping on downgrade described in the registry wire
/// protocol's transport requirements.
pub struct Transport {
    https_client: reqwest::Client,
    insecure_https_client: reqwest::Client,
    http_client: reqwest::Client,
    history: FailoverHistory,
    config: TransportConfig,
}

impl Transport {
    /// Build a transport from `config`.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let build = |accept_invalid_certs: bool| {
            reqwest::Client::builder()
                .timeout(config.timeout)
                .danger_accept_invalid_certs(accept_invalid_certs)
                .redirect(reqwest::redirect::Policy::none())
                .user_agent(&config.user_agent)
                .build()
                .map_err(|e| Error::Io {
                    operation: "build client".to_string(),
                    source: e,
                })
        };
        Ok(Self {
            https_client: build(false)?,
            insecure_https_client: build(true)?,
            http_client: build(false)?,
            history: FailoverHistory::new(),
            config,
        })
    }

    /// Execute `request`, following redirects and the failover ladder as
    /// needed. Returns the final response once a non-redirect status is
    /// reached, or a transport-level error if every ladder tier and retry
    /// attempt is exhausted.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let materialized_body = match &request.body {
            Some(blob) => {
                let mut buf = Vec::new();
                blob.write_to(&mut buf)
                    .await
                    .map_err(|_| Error::BodyNotRetryable)?;
                Some((buf, blob.is_retryable()))
            }
            None => None,
        };

        let mut current_url = request.url.clone();
        let mut redirects = 0usize;
        loop {
            let response = self
                .execute_with_failover(&request, &current_url, materialized_body.as_ref())
                .await?;

            if matches!(response.status(), 301 | 302 | 307 | 308) {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    let location = response
                        .header("location")
                        .unwrap_or_default()
                        .to_string();
                    return Err(Error::TooManyRedirects {
                        last_location: location,
                    });
                }
                let location = response
                    .header("location")
                    .ok_or_else(|| Error::InvalidRedirect("missing Location header".into()))?;
                current_url = current_url
                    .join(location)
                    .map_err(|_| Error::InvalidRedirect(location.to_string()))?;
                continue;
            }

            return Ok(response);
        }
    }

    async fn execute_with_failover(
        &self,
        request: &Request,
        url: &url::Url,
        body: Option<&(Vec<u8>, bool)>,
    ) -> Result<Response> {
        let host = url.host_str().unwrap_or_default().to_string();
        let port = url.port_or_known_default().unwrap_or(443);

        if let Some(tier) = self.history.get(&host, port) {
            let (client, tiered_url) = self.tiered(url, tier);
            return self
                .attempt_with_retry(&client, request, &tiered_url, body)
                .await;
        }

        // Step 1: HTTPS on the requested port.
        match self
            .attempt_with_retry(&self.https_client, request, url, body)
            .await
        {
            Ok(resp) => {
                self.history.record(&host, port, Tier::Https);
                return Ok(resp);
            }
            Err(e) if is_tls_failure(&e) => {
                tracing::warn!(%host, port, "TLS handshake failed, trying insecure HTTPS");
            }
            Err(e) if is_bare_connect_failure(&e) && url.port().is_none() => {
                tracing::warn!(%host, "connect failed with no port specified, trying plain HTTP on port 80");
                let http_url = with_scheme_and_port(url, "http", Some(80));
                let response = self
                    .attempt_with_retry(&self.http_client, request, &http_url, body)
                    .await?;
                self.history.record(&host, port, Tier::Http);
                return Ok(response);
            }
            Err(e) => return Err(e),
        }

        if self.config.strict {
            return Err(Error::InsecureConnection { host, port });
        }

        // Step 2: HTTPS with certificate validation disabled.
        match self
            .attempt_with_retry(&self.insecure_https_client, request, url, body)
            .await
        {
            Ok(resp) => {
                self.history.record(&host, port, Tier::InsecureHttps);
                return Ok(resp);
            }
            Err(e) if is_tls_failure(&e) => {
                tracing::warn!(%host, port, "insecure HTTPS also failed TLS, falling back to plain HTTP");
            }
            Err(e) => return Err(e),
        }

        // Step 3: plain HTTP on the same port.
        let http_url = with_scheme_and_port(url, "http", None);
        let response = self
            .attempt_with_retry(&self.http_client, request, &http_url, body)
            .await?;
        self.history.record(&host, port, Tier::Http);
        Ok(response)
    }

    fn tiered(&self, url: &url::Url, tier: Tier) -> (reqwest::Client, url::Url) {
        match tier {
            Tier::Https => (self.https_client.clone(), url.clone()),
            Tier::InsecureHttps => (self.insecure_https_client.clone(), url.clone()),
            Tier::Http => (
                self.http_client.clone(),
                with_scheme_and_port(url, "http", None),
            ),
        }
    }

    async fn attempt_with_retry(
        &self,
        client: &reqwest::Client,
        request: &Request,
        url: &url::Url,
        body: Option<&(Vec<u8>, bool)>,
    ) -> Result<Response> {
        let deadline = tokio::time::Instant::now() + self.config.retry_budget;
        let mut backoff = Duration::from_millis(100);
        let strip_auth = url.scheme() == "http" && !request.allow_credentials_over_http;

        loop {
            match self.attempt_once(client, request, url, body, strip_auth).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let can_retry_method = request.method.is_idempotent()
                        || body.is_none_or(|(_, retryable)| *retryable);
                    if !e.is_retryable() || !can_retry_method || tokio::time::Instant::now() >= deadline {
                        return Err(Error::RetriesExhausted {
                            source: Box::new(e),
                        });
                    }
                    tracing::debug!(error = %e, ?backoff, "retrying request");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(5));
                }
            }
        }
    }

    async fn attempt_once(
        &self,
        client: &reqwest::Client,
        request: &Request,
        url: &url::Url,
        body: Option<&(Vec<u8>, bool)>,
        strip_auth: bool,
    ) -> Result<Response> {
        let mut builder = client.request(request.method.to_reqwest(), url.clone());
        for (name, value) in &request.headers {
            if strip_auth && name.eq_ignore_ascii_case("authorization") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_str(name),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }
        if let Some((bytes, _)) = body {
            builder = builder.body(bytes.clone());
        }

        let response = builder.send().await.map_err(|source| {
            if is_tls_error(&source) {
                Error::Tls {
                    host: url.host_str().unwrap_or_default().to_string(),
                    port: url.port_or_known_default().unwrap_or(443),
                    source,
                }
            } else {
                Error::Io {
                    operation: format!("{} {}", request.method.to_reqwest(), url),
                    source,
                }
            }
        })?;

        Ok(Response {
            credentials_stripped: strip_auth && request.has_authorization(),
            inner: response,
        })
    }
}

fn with_scheme_and_port(url: &url::Url, scheme: &str, port: Option<u16>) -> url::Url {
    let mut out = url.clone();
    let _ = out.set_scheme(scheme);
    let _ = out.set_port(port);
    out
}

fn is_tls_error(e: &reqwest::Error) -> bool {
    if !e.is_connect() {
        return false;
    }
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        let text = err.to_string().to_lowercase();
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        source = err.source();
    }
    false
}

fn is_tls_failure(e: &Error) -> bool {
    matches!(e, Error::RetriesExhausted { source } if matches!(**source, Error::Tls { .. }))
        || matches!(e, Error::Tls { .. })
}

fn is_bare_connect_failure(e: &Error) -> bool {
    let inner = match e {
        Error::RetriesExhausted { source } => source.as_ref(),
        other => other,
    };
    matches!(inner, Error::Io { source, .. } if source.is_connect() && !source.is_timeout())
}

/// Header name used to inspect the outcome of an auth challenge. Re-exported
/// for the registry crate's convenience.
pub const WWW_AUTHENTICATE: &str = "www-authenticate";
