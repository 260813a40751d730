//! One-shot market open/closed probe.
//!
//! Queries the GOLD snapshot endpoint and classifies the outcome. The
//! backend's own invalid-session error code is kept distinct from transport
//! errors and from a locally-absent credential: only session expiry should
//! trigger re-acquisition, everything else surfaces a status and stops.

use serde::Deserialize;
use tracing::warn;

use crate::session::SessionCredential;

/// GOLD market snapshot endpoint.
pub const MARKET_SNAPSHOT_URL: &str =
    "https://api-capital.backend-capital.com/api/v1/markets/GOLD";

/// Error code the backend returns for a rejected session token.
pub const INVALID_SESSION_CODE: &str = "error.invalid.session.token";

/// Request headers carrying the session tokens.
pub const CST_HEADER: &str = "CST";
pub const SECURITY_TOKEN_HEADER: &str = "X-SECURITY-TOKEN";

/// Outcome of a market status probe.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketProbe {
    /// Market is trading; `bid` is the last quote.
    Open { bid: f64 },
    /// Market is closed; `bid` is the last traded quote to display
    /// statically.
    Closed { bid: f64 },
    /// The backend rejected the session token. Re-acquire and retry.
    SessionExpired,
    /// No credential was available locally.
    NoSession,
    /// Transport or parse failure.
    Error,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
    #[serde(default)]
    snapshot: Option<Snapshot>,
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(rename = "marketStatus")]
    market_status: String,
    bid: f64,
}

/// One-shot snapshot query against the market-data backend.
#[derive(Debug)]
pub struct MarketStatusProbe {
    client: reqwest::Client,
    url: String,
}

impl MarketStatusProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, MARKET_SNAPSHOT_URL)
    }

    pub fn with_url(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn check(&self, credential: Option<&SessionCredential>) -> MarketProbe {
        let Some(credential) = credential else {
            return MarketProbe::NoSession;
        };

        let response = match self
            .client
            .get(&self.url)
            .header(CST_HEADER, &credential.security_id)
            .header(SECURITY_TOKEN_HEADER, &credential.security_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "market status request failed");
                return MarketProbe::Error;
            }
        };

        match response.text().await {
            Ok(body) => classify_snapshot(&body),
            Err(error) => {
                warn!(%error, "market status body unreadable");
                MarketProbe::Error
            }
        }
    }
}

/// Classify a raw snapshot response body.
fn classify_snapshot(body: &str) -> MarketProbe {
    let parsed: SnapshotResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(%error, "malformed market snapshot");
            return MarketProbe::Error;
        }
    };

    if let Some(code) = parsed.error_code {
        if code == INVALID_SESSION_CODE {
            return MarketProbe::SessionExpired;
        }
        warn!(code, "market snapshot returned error code");
        return MarketProbe::Error;
    }

    match parsed.snapshot {
        Some(snapshot) => match snapshot.market_status.as_str() {
            // Upstream reports TRADEABLE for an open market; older variants
            // used OPEN.
            "TRADEABLE" | "OPEN" => MarketProbe::Open { bid: snapshot.bid },
            _ => MarketProbe::Closed { bid: snapshot.bid },
        },
        None => {
            warn!("market snapshot missing payload");
            MarketProbe::Error
        }
    }
}
