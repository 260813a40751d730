//! Two-token session credential acquisition.
//!
//! The market-data backend authenticates with a pair of opaque tokens
//! returned in the response headers of the session-creation endpoint. The
//! credential stays valid until the backend rejects it; there is no local
//! expiry tracking and no explicit revocation.

use reqwest::header::HeaderMap;
use serde_json::json;
use tracing::{error, info};

use crate::error::SessionError;

/// Session-creation endpoint.
pub const SESSION_URL: &str = "https://api-capital.backend-capital.com/api/v1/session";

/// API key header expected by the session endpoint.
pub const API_KEY_HEADER: &str = "X-CAP-API-KEY";

/// Response headers carrying the two session tokens.
pub const CST_HEADER: &str = "cst";
pub const SECURITY_TOKEN_HEADER: &str = "x-security-token";

/// The two-token pair required by the market-data backend. Opaque; valid
/// until rejected with the backend's invalid-token error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub security_id: String,
    pub security_token: String,
}

/// Session endpoint configuration. Credentials are embedded per deployment
/// and overridable through the environment.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: String,
    pub api_key: String,
    pub identifier: String,
    pub password: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: SESSION_URL.to_string(),
            api_key: String::new(),
            identifier: String::new(),
            password: String::new(),
        }
    }
}

impl SessionConfig {
    /// Build from `GOLDSCALE_API_KEY` / `GOLDSCALE_IDENTIFIER` /
    /// `GOLDSCALE_PASSWORD` (and optional `GOLDSCALE_SESSION_URL`).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("GOLDSCALE_SESSION_URL").unwrap_or(defaults.url),
            api_key: std::env::var("GOLDSCALE_API_KEY").unwrap_or(defaults.api_key),
            identifier: std::env::var("GOLDSCALE_IDENTIFIER").unwrap_or(defaults.identifier),
            password: std::env::var("GOLDSCALE_PASSWORD").unwrap_or(defaults.password),
        }
    }
}

/// Acquires and re-acquires session credentials. Owns the only mutable copy;
/// feeds borrow the credential for the duration of one connection attempt.
#[derive(Debug)]
pub struct SessionManager {
    client: reqwest::Client,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(client: reqwest::Client, config: SessionConfig) -> Self {
        Self { client, config }
    }

    /// Create a fresh session. Any failure is reported as a value; this
    /// never panics and never retries internally (the orchestrator decides
    /// when to try again).
    pub async fn acquire(&self) -> Result<SessionCredential, SessionError> {
        let response = self
            .client
            .post(&self.config.url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&json!({
                "identifier": self.config.identifier,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(|error| {
                error!(%error, "session request failed");
                SessionError::Request(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "session creation rejected");
            return Err(SessionError::Status(status.as_u16()));
        }

        let credential =
            credential_from_headers(response.headers()).ok_or(SessionError::MissingTokens)?;
        info!("session created");
        Ok(credential)
    }
}

/// Extract the token pair from session-creation response headers.
pub fn credential_from_headers(headers: &HeaderMap) -> Option<SessionCredential> {
    let security_id = headers.get(CST_HEADER)?.to_str().ok()?;
    let security_token = headers.get(SECURITY_TOKEN_HEADER)?.to_str().ok()?;
    Some(SessionCredential {
        security_id: security_id.to_string(),
        security_token: security_token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(entries: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in entries {
            map.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_credential_from_headers() {
        let map = headers(&[("cst", "abc123"), ("x-security-token", "tok456")]);
        let credential = credential_from_headers(&map).unwrap();
        assert_eq!(credential.security_id, "abc123");
        assert_eq!(credential.security_token, "tok456");
    }

    #[test]
    fn test_credential_missing_either_header() {
        let only_cst = headers(&[("cst", "abc123")]);
        assert_eq!(credential_from_headers(&only_cst), None);

        let only_token = headers(&[("x-security-token", "tok456")]);
        assert_eq!(credential_from_headers(&only_token), None);

        assert_eq!(credential_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.url, SESSION_URL);
        assert!(config.api_key.is_empty());
    }
}
