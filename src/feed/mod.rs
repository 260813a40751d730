//! Streaming feed connections.
//!
//! Two independent persistent connections (gold price, scale weight), each
//! running its own reconnect state machine with a per-feed fixed retry
//! delay. Exactly one physical socket is live per feed; a superseded
//! connection is simply dropped. While the network-online flag is false,
//! reconnect attempts are suspended; the flag flipping true wakes every
//! suspended loop for one immediate attempt.

use derive_more::Display;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub mod price;
pub mod scale;

/// Connection state of a single feed, published over a watch channel and
/// driving the user-visible status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    #[display("disconnected")]
    Disconnected,
    #[display("connecting")]
    Connecting,
    #[display("connected")]
    Connected,
    #[display("errored")]
    Errored,
}

/// Per-feed connection configuration. Retry delays are configuration, not
/// universal constants: the price feed redials quickly, the scale feed's
/// default is effectively disabled.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Endpoint URL.
    pub url: String,
    /// Delay before redialing after a close or stream error.
    pub retry_delay: Duration,
    /// Delay before redialing after the connection could not be constructed
    /// at all.
    pub connect_fail_delay: Duration,
    /// Event channel buffer size.
    pub channel_buffer_size: usize,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_delay: Duration::from_secs(3),
            connect_fail_delay: Duration::from_secs(5),
            channel_buffer_size: 64,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_connect_fail_delay(mut self, delay: Duration) -> Self {
        self.connect_fail_delay = delay;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

/// Handle to a spawned feed task. Closing is idempotent: repeated closes,
/// or closing after the task already finished, neither panic nor schedule
/// extra reconnects.
#[derive(Debug)]
pub struct FeedHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub(crate) fn new(shutdown_tx: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { shutdown_tx, task }
    }

    /// Ask the feed task to stop. Safe to call any number of times.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.close();
        self.task.abort();
    }
}

/// Block until the online flag is true. A dropped sender counts as online
/// so a feed without network supervision keeps reconnecting.
pub(crate) async fn wait_until_online(online: &mut watch::Receiver<bool>) {
    let _ = online.wait_for(|on| *on).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_config_builder() {
        let config = FeedConfig::new("ws://127.0.0.1:81")
            .with_retry_delay(Duration::from_millis(99_999))
            .with_connect_fail_delay(Duration::from_secs(10))
            .with_channel_buffer_size(8);

        assert_eq!(config.url, "ws://127.0.0.1:81");
        assert_eq!(config.retry_delay, Duration::from_millis(99_999));
        assert_eq!(config.connect_fail_delay, Duration::from_secs(10));
        assert_eq!(config.channel_buffer_size, 8);
    }

    #[test]
    fn test_connection_state_labels() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Errored.to_string(), "errored");
    }

    #[tokio::test]
    async fn test_feed_handle_close_is_idempotent() {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        });
        let handle = FeedHandle::new(shutdown_tx, task);

        handle.close();
        handle.close();

        // Task observed the shutdown exactly once and exited.
        tokio::time::timeout(Duration::from_secs(1), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("feed task should stop after close");

        // Closing after the task finished is still a no-op.
        handle.close();
    }

    #[tokio::test]
    async fn test_wait_until_online_resumes_on_flag() {
        let (online_tx, mut online_rx) = watch::channel(false);

        let waiter = tokio::spawn(async move {
            wait_until_online(&mut online_rx).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        online_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on online transition")
            .unwrap();
    }
}
