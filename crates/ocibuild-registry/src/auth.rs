//! Credential supply and `WWW-Authenticate` challenge handling.

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use std::collections::HashMap;

/// Username/password credentials for a single registry host.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Registry username.
    pub username: String,
    /// Registry password or personal access token.
    pub password: String,
}

/// Supplies credentials for a registry host. Implementations might read
/// from the environment, a Docker config file, or an OS keychain.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Look up credentials for `registry`. `None` means "try anonymously".
    async fn credentials_for(&self, registry: &str) -> Option<Credentials>;
}

/// A provider that never supplies credentials; every request is attempted
/// anonymously.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousCredentialProvider;

#[async_trait]
impl CredentialProvider for AnonymousCredentialProvider {
    async fn credentials_for(&self, _registry: &str) -> Option<Credentials> {
        None
    }
}

/// A resolved `Authorization` header value to send with subsequent requests.
/// `None` means the registry issued no challenge and no header is sent.
pub type Authorization = Option<String>;

/// A parsed `WWW-Authenticate` challenge.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Challenge {
    /// `WWW-Authenticate: Basic realm="..."`.
    Basic,
    /// `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`.
    Bearer {
        /// Token endpoint.
        realm: String,
        /// `service` parameter, if present.
        service: Option<String>,
        /// `scope` parameter, if present.
        scope: Option<String>,
    },
}

/// Parse a `WWW-Authenticate` header value into a [`Challenge`].
pub fn parse_challenge(header: &str) -> Result<Challenge> {
    let header = header.trim();
    if let Some(rest) = header.strip_prefix("Bearer ") {
        let params = parse_auth_params(rest);
        let realm = params
            .get("realm")
            .cloned()
            .ok_or_else(|| Error::BadChallenge(header.to_string()))?;
        return Ok(Challenge::Bearer {
            realm,
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        });
    }
    if header.starts_with("Basic") {
        return Ok(Challenge::Basic);
    }
    Err(Error::BadChallenge(header.to_string()))
}

fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for part in split_params(input) {
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"');
            out.insert(key.trim().to_string(), value.to_string());
        }
    }
    out
}

/// Splits `k1="v,1",k2="v2"` on top-level commas, respecting quoted values
/// that may themselves contain commas.
fn split_params(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(input[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(input[start..].trim());
    parts
}

/// Encode HTTP Basic auth credentials.
#[must_use]
pub fn basic_auth_header(credentials: &Credentials) -> String {
    let raw = format!("{}:{}", credentials.username, credentials.password);
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let header =
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/alpine:pull""#;
        let challenge = parse_challenge(header).unwrap();
        assert_eq!(
            challenge,
            Challenge::Bearer {
                realm: "https://auth.docker.io/token".to_string(),
                service: Some("registry.docker.io".to_string()),
                scope: Some("repository:library/alpine:pull".to_string()),
            }
        );
    }

    #[test]
    fn parses_basic_challenge() {
        let challenge = parse_challenge(r#"Basic realm="registry""#).unwrap();
        assert_eq!(challenge, Challenge::Basic);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_challenge("Digest realm=\"x\"").is_err());
    }

    #[test]
    fn bearer_without_realm_is_rejected() {
        assert!(parse_challenge(r#"Bearer service="x""#).is_err());
    }

    #[test]
    fn encodes_basic_auth() {
        let creds = Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        assert_eq!(basic_auth_header(&creds), "Basic YWxpY2U6aHVudGVyMg==");
    }
}
