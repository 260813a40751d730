//! Startup sequencing and the runtime event loop.
//!
//! The price pipeline is strictly ordered: acquire a session, probe the
//! market, then either stream live quotes or display the static closed-market
//! bid. The scale feed runs independently of all of that. Session expiry
//! reported by the probe or mid-stream restarts the pipeline from the
//! session step; any other halt waits a fixed delay and retries from the
//! probe step.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use crate::config::ConfigStore;
use crate::feed::price::{spawn_price_feed, PriceEvent};
use crate::feed::scale::spawn_scale_feed;
use crate::feed::{ConnectionState, FeedConfig, FeedHandle};
use crate::market::{MarketProbe, MarketStatusProbe};
use crate::pricing::{self, Direction};
use crate::session::SessionManager;

use super::{recompute, AppState, PriceUpdate};

/// Delay before retrying the startup sequence after a halting failure.
pub const INIT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Display timezone (Riyadh, UTC+3).
static DISPLAY_TZ: LazyLock<FixedOffset> =
    LazyLock::new(|| FixedOffset::east_opt(3 * 3600).expect("valid fixed offset"));

/// Outcome of one run of the startup sequence.
enum Pipeline {
    /// Market open; quotes stream in over the receiver.
    Streaming {
        handle: FeedHandle,
        events: mpsc::Receiver<PriceEvent>,
    },
    /// Market closed; the static bid has been applied to the state.
    Static,
    /// Session or probe failure; retry the sequence after the fixed delay.
    Halted,
}

/// Owns the state, the session, and the feed lifecycles.
pub struct Orchestrator {
    state: Arc<Mutex<AppState>>,
    store: Arc<ConfigStore>,
    session: SessionManager,
    probe: MarketStatusProbe,
    price_config: FeedConfig,
    scale_config: FeedConfig,
    online: watch::Receiver<bool>,
    price_status_tx: watch::Sender<ConnectionState>,
    scale_status_tx: watch::Sender<ConnectionState>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<Mutex<AppState>>,
        store: Arc<ConfigStore>,
        session: SessionManager,
        probe: MarketStatusProbe,
        price_config: FeedConfig,
        scale_config: FeedConfig,
        online: watch::Receiver<bool>,
        price_status_tx: watch::Sender<ConnectionState>,
        scale_status_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            state,
            store,
            session,
            probe,
            price_config,
            scale_config,
            online,
            price_status_tx,
            scale_status_tx,
        }
    }

    /// Run until shutdown is requested.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // Seed the display with the last known price while the pipeline
        // starts up.
        if let Some(remembered) = self.store.offline_gold_price() {
            let mut state = self.state.lock().await;
            state.spot_price = remembered;
            state.display_spot = remembered;
            let update = recompute(&mut state, &self.store);
            drop(state);
            log_update(&update, "remembered");
        }

        // The scale feed is independent of session and market status and
        // outlives pipeline restarts.
        let (weight_tx, mut weight_rx) =
            mpsc::channel(self.scale_config.channel_buffer_size);
        let _scale_handle = spawn_scale_feed(
            self.scale_config.clone(),
            weight_tx,
            self.scale_status_tx.clone(),
            self.online.clone(),
        );

        let mut pipeline = self.start_price_pipeline().await;

        loop {
            pipeline = match pipeline {
                Pipeline::Streaming { handle, mut events } => loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                handle.close();
                                return;
                            }
                        }
                        weight = weight_rx.recv() => {
                            if let Some(weight) = weight {
                                self.on_weight(weight).await;
                            }
                        }
                        event = events.recv() => match event {
                            Some(PriceEvent::Quote(bid)) => {
                                self.on_quote(bid).await;
                            }
                            Some(PriceEvent::SessionExpired) => {
                                warn!("session expired mid-stream, restarting pipeline");
                                handle.close();
                                break self.start_price_pipeline().await;
                            }
                            None => {
                                warn!("price feed ended, restarting pipeline");
                                handle.close();
                                break self.start_price_pipeline().await;
                            }
                        }
                    }
                },
                // Static until shutdown; weight changes still reprice.
                Pipeline::Static => loop {
                    tokio::select! {
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                        weight = weight_rx.recv() => {
                            if let Some(weight) = weight {
                                self.on_weight(weight).await;
                            }
                        }
                    }
                },
                Pipeline::Halted => {
                    let retry = tokio::time::sleep(INIT_RETRY_DELAY);
                    tokio::pin!(retry);
                    loop {
                        tokio::select! {
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    return;
                                }
                            }
                            weight = weight_rx.recv() => {
                                if let Some(weight) = weight {
                                    self.on_weight(weight).await;
                                }
                            }
                            _ = &mut retry => {
                                break self.start_price_pipeline().await;
                            }
                        }
                    }
                }
            };
        }
    }

    /// Session -> market probe -> feed. Session expiry loops back to
    /// re-acquisition; everything else either streams, goes static, or
    /// halts for the retry delay.
    async fn start_price_pipeline(&self) -> Pipeline {
        let mut credential = match self.session.acquire().await {
            Ok(credential) => credential,
            Err(error) => {
                error!(%error, "session acquisition failed");
                return Pipeline::Halted;
            }
        };

        let mut reacquired = false;
        loop {
            match self.probe.check(Some(&credential)).await {
                MarketProbe::Open { bid } => {
                    info!(bid, "market open, starting live price feed");
                    self.on_quote(bid).await;

                    let (event_tx, event_rx) =
                        mpsc::channel(self.price_config.channel_buffer_size);
                    let handle = spawn_price_feed(
                        self.price_config.clone(),
                        credential,
                        event_tx,
                        self.price_status_tx.clone(),
                        self.online.clone(),
                    );
                    return Pipeline::Streaming {
                        handle,
                        events: event_rx,
                    };
                }
                MarketProbe::Closed { bid } => {
                    info!(bid, "market closed, displaying static price");
                    self.store.set_offline_gold_price(bid);

                    let mut state = self.state.lock().await;
                    state.spot_price = bid;
                    state.display_spot = bid;
                    let update = recompute(&mut state, &self.store);
                    drop(state);
                    log_update(&update, "static");
                    return Pipeline::Static;
                }
                MarketProbe::SessionExpired => {
                    // A fresh credential rejected twice in a row means the
                    // account itself is broken; stop instead of spinning.
                    if reacquired {
                        error!("fresh session rejected by market probe");
                        return Pipeline::Halted;
                    }
                    warn!("market probe rejected session, re-acquiring");
                    credential = match self.session.acquire().await {
                        Ok(credential) => credential,
                        Err(error) => {
                            error!(%error, "session re-acquisition failed");
                            return Pipeline::Halted;
                        }
                    };
                    reacquired = true;
                }
                MarketProbe::NoSession | MarketProbe::Error => {
                    error!("market status unavailable");
                    return Pipeline::Halted;
                }
            }
        }
    }

    async fn on_quote(&self, bid: f64) {
        let mut state = self.state.lock().await;
        state.spot_price = bid;
        state.display_spot = if state.fluctuation_enabled {
            pricing::apply_fluctuation(bid, self.store.fluctuation_range())
        } else {
            bid
        };
        let update = recompute(&mut state, &self.store);
        drop(state);
        log_update(&update, "quote");
    }

    async fn on_weight(&self, weight: f64) {
        let mut state = self.state.lock().await;
        state.live_weight = weight;
        let update = recompute(&mut state, &self.store);
        drop(state);
        log_update(&update, "weight");
    }
}

fn log_update(update: &PriceUpdate, trigger: &str) {
    let stamp = Utc::now().with_timezone(&*DISPLAY_TZ).format("%H:%M:%S");

    match update.total {
        Some(total) => {
            let arrow = match update.direction {
                Direction::Up => "up",
                Direction::Down => "down",
                Direction::Flat => "flat",
            };
            info!(%stamp, trigger, total = format!("{total:.2}"), direction = arrow, "price updated");
        }
        None => info!(%stamp, trigger, "price unavailable"),
    }
}
