//! Request/response types for the transport layer.

use ocibuild_digest::Blob;
use std::sync::Arc;

/// HTTP method a [`Request`] may use. Limited to what the registry wire
/// protocol needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `HEAD`
    Head,
}

impl Method {
    /// Whether this method is idempotent (safe to retry on a transport
    /// failure regardless of body retryability).
    #[must_use]
    pub fn is_idempotent(self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Put)
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
        }
    }
}

/// A single transport-layer request.
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Target URL. Not sanitized before sending: some registries are
    /// non-conforming and expect the raw path/query to reach them
    /// unmodified.
    pub url: url::Url,
    /// Header name/value pairs, sent as given.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<Arc<dyn Blob>>,
    /// Whether the caller has explicitly opted in to sending the
    /// `Authorization` header over a cleartext connection. Transport strips
    /// it on downgrade unless this is set.
    pub allow_credentials_over_http: bool,
}

impl Request {
    /// Build a request with no body and no headers.
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            allow_credentials_over_http: false,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a body blob.
    #[must_use]
    pub fn with_body(mut self, body: Arc<dyn Blob>) -> Self {
        self.body = Some(body);
        self
    }

    /// Opt in to sending `Authorization` even if the request is downgraded
    /// to cleartext HTTP.
    #[must_use]
    pub fn allowing_credentials_over_http(mut self) -> Self {
        self.allow_credentials_over_http = true;
        self
    }

    pub(crate) fn has_authorization(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("authorization"))
    }
}

/// A response from the transport layer.
pub struct Response {
    /// The underlying `reqwest` response. Callers read the body through it
    /// (`bytes()`, `bytes_stream()`, `json()`, ...).
    pub inner: reqwest::Response,
    /// Set when the `Authorization` header was present on the request but
    /// was stripped before sending because the connection was downgraded to
    /// cleartext HTTP. Lets the registry client distinguish "credentials
    /// rejected" from "credentials refused to be sent".
    pub credentials_stripped: bool,
}

impl Response {
    /// HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Header value, if present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }
}
