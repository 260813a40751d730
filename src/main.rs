use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use goldscale::app::orchestrator::Orchestrator;
use goldscale::app::AppState;
use goldscale::config::ConfigStore;
use goldscale::device::{self, SubscriptionStatus, DEVICE_INFO_URL};
use goldscale::feed::price::PRICE_STREAM_URL;
use goldscale::feed::scale::scale_feed_config;
use goldscale::feed::{ConnectionState, FeedConfig};
use goldscale::market::MarketStatusProbe;
use goldscale::session::{SessionConfig, SessionManager};

/// TCP endpoint used to decide whether the network is reachable.
const CONNECTIVITY_PROBE_ADDR: &str = "1.1.1.1:53";
const CONNECTIVITY_CHECK_INTERVAL: Duration = Duration::from_secs(30);
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    init_logging();

    info!("starting goldscale price display");

    // Persistent settings file; path configurable via GOLDSCALE_CONFIG.
    let config_path = std::env::var("GOLDSCALE_CONFIG")
        .unwrap_or_else(|_| "goldscale-settings.json".to_string());
    let store = Arc::new(ConfigStore::open(config_path));
    info!(path = %store.path().display(), "settings loaded");

    let client = reqwest::Client::new();

    let session_config = SessionConfig::from_env();
    if session_config.api_key.is_empty() {
        warn!("GOLDSCALE_API_KEY not set, session acquisition will fail");
    }
    let session = SessionManager::new(client.clone(), session_config);
    let probe = MarketStatusProbe::new(client.clone());

    // Subscription gating drives a status line only; the price pipeline
    // does not wait on it.
    check_device_subscription(&client).await;

    // Network-online flag. While false, every feed suspends its reconnect
    // loop; flipping back to true wakes them for an immediate attempt.
    let (online_tx, online_rx) = watch::channel(true);
    let connectivity_addr = std::env::var("GOLDSCALE_CONNECTIVITY_ADDR")
        .unwrap_or_else(|_| CONNECTIVITY_PROBE_ADDR.to_string());
    spawn_connectivity_monitor(online_tx, connectivity_addr, CONNECTIVITY_CHECK_INTERVAL);

    let scale_host =
        std::env::var("GOLDSCALE_SCALE_HOST").unwrap_or_else(|_| "192.168.1.50".to_string());
    let scale_config = scale_feed_config(&scale_host);
    let price_config = FeedConfig::new(PRICE_STREAM_URL);

    let (price_status_tx, price_status_rx) = watch::channel(ConnectionState::Disconnected);
    let (scale_status_tx, scale_status_rx) = watch::channel(ConnectionState::Disconnected);
    spawn_status_logger("price", price_status_rx);
    spawn_status_logger("scale", scale_status_rx);

    let state = Arc::new(Mutex::new(AppState::new(&store.manufacturing_settings())));

    let orchestrator = Orchestrator::new(
        state,
        store,
        session,
        probe,
        price_config,
        scale_config,
        online_rx,
        price_status_tx,
        scale_status_tx,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(orchestrator.run(shutdown_rx));

    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = runner.await;
}

/// Fetch the device MAC and log the subscription status.
async fn check_device_subscription(client: &reqwest::Client) {
    let info_url =
        std::env::var("GOLDSCALE_DEVICE_INFO_URL").unwrap_or_else(|_| DEVICE_INFO_URL.to_string());
    let Ok(lookup_url) = std::env::var("GOLDSCALE_SUBSCRIPTION_URL") else {
        info!("no subscription lookup configured, skipping device check");
        return;
    };

    let Some(mac) = device::fetch_device_mac(client, &info_url).await else {
        warn!("device identity unavailable, subscription unchecked");
        return;
    };

    match device::check_subscription(client, &lookup_url, &mac).await {
        SubscriptionStatus::Active => info!(mac, "device subscription active"),
        SubscriptionStatus::Expired => warn!(mac, "device subscription expired"),
        SubscriptionStatus::Unknown => warn!(mac, "device subscription unknown"),
    }
}

/// Poll a TCP endpoint and publish reachability over the online flag.
/// Transitions are logged; the feeds react by suspending or resuming their
/// reconnect loops.
fn spawn_connectivity_monitor(
    online_tx: watch::Sender<bool>,
    addr: String,
    check_interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        loop {
            ticker.tick().await;

            let reachable = tokio::time::timeout(
                CONNECTIVITY_TIMEOUT,
                tokio::net::TcpStream::connect(&addr),
            )
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false);

            if *online_tx.borrow() != reachable {
                if reachable {
                    info!("network restored, resuming reconnects");
                } else {
                    warn!(addr = %addr, "network unreachable, suspending reconnects");
                }
                if online_tx.send(reachable).is_err() {
                    break;
                }
            }
        }
    });
}

/// Log every connection-state transition of a feed.
fn spawn_status_logger(feed: &'static str, mut status_rx: watch::Receiver<ConnectionState>) {
    tokio::spawn(async move {
        loop {
            let state = *status_rx.borrow_and_update();
            info!(feed, %state, "feed status");
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    });
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connectivity_monitor_drops_flag_when_unreachable() {
        // Nothing listens on the discard port; connects are refused.
        let (online_tx, mut online_rx) = watch::channel(true);
        spawn_connectivity_monitor(
            online_tx,
            "127.0.0.1:9".to_string(),
            Duration::from_millis(10),
        );

        tokio::time::timeout(Duration::from_secs(2), online_rx.wait_for(|on| !*on))
            .await
            .expect("flag should drop when the probe endpoint is unreachable")
            .expect("monitor should outlive the receiver");
    }

    #[tokio::test]
    async fn test_connectivity_monitor_keeps_flag_up_when_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind probe endpoint");
        let addr = listener.local_addr().expect("local addr").to_string();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let (online_tx, online_rx) = watch::channel(true);
        spawn_connectivity_monitor(online_tx, addr, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(*online_rx.borrow());
    }
}
