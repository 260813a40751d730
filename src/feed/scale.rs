//! Scale weight streaming connection.
//!
//! A passive push stream from the local weighing device: nothing is sent
//! after the socket opens, and inbound frames are bare numeric strings, one
//! per sample. Garbage samples are dropped. The default retry delay is
//! effectively disabled (the device rarely comes back without a restart);
//! it stays a per-feed configuration knob.

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{wait_until_online, ConnectionState, FeedConfig, FeedHandle};
use crate::error::Fault;

/// Port the weighing device listens on.
pub const DEFAULT_SCALE_PORT: u16 = 81;

/// Default redial delay; long enough to be effectively disabled.
pub const DEFAULT_SCALE_RETRY_DELAY: std::time::Duration =
    std::time::Duration::from_millis(99_999);

/// Feed configuration for a scale at `host`.
pub fn scale_feed_config(host: &str) -> FeedConfig {
    FeedConfig::new(format!("ws://{}:{}/", host, DEFAULT_SCALE_PORT))
        .with_retry_delay(DEFAULT_SCALE_RETRY_DELAY)
        .with_connect_fail_delay(DEFAULT_SCALE_RETRY_DELAY)
}

/// Parse one weight sample. Bare numeric string, grams; anything else is
/// dropped.
fn parse_weight(text: &str) -> Option<f64> {
    let weight: f64 = text.trim().parse().ok()?;
    weight.is_finite().then_some(weight)
}

/// Spawn the weight feed task. Not gated on session or market status.
pub fn spawn_scale_feed(
    config: FeedConfig,
    weight_tx: mpsc::Sender<f64>,
    status_tx: watch::Sender<ConnectionState>,
    online: watch::Receiver<bool>,
) -> FeedHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_scale_feed(
        config,
        weight_tx,
        status_tx,
        online,
        shutdown_rx,
    ));
    FeedHandle::new(shutdown_tx, task)
}

async fn run_scale_feed(
    config: FeedConfig,
    weight_tx: mpsc::Sender<f64>,
    status_tx: watch::Sender<ConnectionState>,
    mut online: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(url = %config.url, "starting scale feed");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        wait_until_online(&mut online).await;
        let _ = status_tx.send(ConnectionState::Connecting);

        let ws_stream = match connect_async(&config.url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(error) => {
                let fault = Fault::Transport(error.to_string());
                error!(%fault, url = %config.url, "scale connection failed");
                let _ = status_tx.send(ConnectionState::Errored);
                tokio::time::sleep(config.connect_fail_delay).await;
                continue;
            }
        };

        info!(url = %config.url, "scale connected");
        let _ = status_tx.send(ConnectionState::Connected);

        let (_, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        return;
                    }
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => match parse_weight(&text) {
                        Some(weight) => {
                            if weight_tx.send(weight).await.is_err() {
                                debug!("weight receiver dropped, stopping feed");
                                let _ = status_tx.send(ConnectionState::Disconnected);
                                return;
                            }
                        }
                        None => {
                            let raw = text.as_str();
                            let fault = Fault::Protocol(format!(
                                "bad weight sample: {}",
                                raw.get(..40).unwrap_or(raw)
                            ));
                            debug!(%fault, "dropping unparseable weight sample");
                        }
                    },
                    Some(Ok(Message::Close(_))) => {
                        warn!("scale connection closed");
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        break;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        let fault = Fault::Transport(error.to_string());
                        error!(%fault, "scale stream error");
                        let _ = status_tx.send(ConnectionState::Errored);
                        break;
                    }
                    None => {
                        let _ = status_tx.send(ConnectionState::Disconnected);
                        break;
                    }
                }
            }
        }

        debug!(delay = ?config.retry_delay, "scale feed redialing");
        tokio::time::sleep(config.retry_delay).await;
    }

    let _ = status_tx.send(ConnectionState::Disconnected);
}
