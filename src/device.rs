//! Device identity and subscription gating.
//!
//! The display device exposes its MAC address over a local `/info` endpoint;
//! a remote lookup keyed by that MAC says whether the device's subscription
//! is active and until when. The price pipeline does not depend on this
//! check, it only drives a status line.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Default local endpoint serving the device identity.
pub const DEVICE_INFO_URL: &str = "http://127.0.0.1/info";

#[derive(Debug, Deserialize)]
struct DeviceInfo {
    mac: String,
}

/// Subscription state for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Expired,
    /// Lookup failed; the device is neither confirmed nor denied.
    Unknown,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRecord {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    valid_until: Option<DateTime<Utc>>,
}

/// Fetch the device MAC from the local info endpoint.
pub async fn fetch_device_mac(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "device info request failed");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!(status = response.status().as_u16(), "device info rejected");
        return None;
    }

    match response.json::<DeviceInfo>().await {
        Ok(info) if !info.mac.is_empty() => Some(info.mac),
        Ok(_) => {
            warn!("device info carried no MAC");
            None
        }
        Err(error) => {
            warn!(%error, "device info unreadable");
            None
        }
    }
}

/// Look up the subscription record for a device MAC.
pub async fn check_subscription(
    client: &reqwest::Client,
    lookup_url: &str,
    mac: &str,
) -> SubscriptionStatus {
    let response = match client.get(lookup_url).query(&[("mac", mac)]).send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "subscription lookup failed");
            return SubscriptionStatus::Unknown;
        }
    };

    if !response.status().is_success() {
        warn!(status = response.status().as_u16(), "subscription lookup rejected");
        return SubscriptionStatus::Unknown;
    }

    match response.json::<SubscriptionRecord>().await {
        Ok(record) => classify_subscription(&record, Utc::now()),
        Err(error) => {
            warn!(%error, "subscription record unreadable");
            SubscriptionStatus::Unknown
        }
    }
}

fn classify_subscription(record: &SubscriptionRecord, now: DateTime<Utc>) -> SubscriptionStatus {
    if !record.active {
        return SubscriptionStatus::Expired;
    }
    match record.valid_until {
        Some(until) if until < now => SubscriptionStatus::Expired,
        _ => SubscriptionStatus::Active,
    }
}
