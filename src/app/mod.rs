//! Application state and price recomputation.
//!
//! All previously-ambient state (selected karat/design, mode, prices,
//! weights) lives in one explicit struct owned at the orchestrator/display
//! boundary. Updates are last-write-wins display refreshes.

use tracing::debug;

use crate::config::defaults::default_design_for;
use crate::config::ConfigStore;
use crate::pricing::{
    self, Direction, Karat, ManufacturingSettings, Mode, SellBreakdown,
};

pub mod orchestrator;

/// Current application state. Shared behind `Arc<tokio::sync::Mutex<_>>`;
/// only one callback mutates it at a time.
#[derive(Debug, Clone)]
pub struct AppState {
    pub karat: Karat,
    pub design: Option<String>,
    pub mode: Mode,
    /// Authoritative spot quote from the feed (or the static bid while the
    /// market is closed). Zero until first data.
    pub spot_price: f64,
    /// Spot used for display: the authoritative quote plus this tick's
    /// fluctuation noise. Recomputed from `spot_price` every tick, never
    /// from itself.
    pub display_spot: f64,
    /// Latest live reading from the scale.
    pub live_weight: f64,
    /// Manual weight override; takes precedence over the scale while set.
    pub manual_weight: Option<f64>,
    /// Grams subtracted for non-gold inlays (buy mode, 18/21K only).
    pub stone_deduction: f64,
    pub fluctuation_enabled: bool,
    /// Previous displayed total, for direction classification.
    pub previous_price: f64,
}

impl AppState {
    pub fn new(settings: &ManufacturingSettings) -> Self {
        let karat = Karat::K18;
        let design = pick_design(settings, karat, None);
        Self {
            karat,
            design,
            mode: Mode::Sell,
            spot_price: 0.0,
            display_spot: 0.0,
            live_weight: 0.0,
            manual_weight: None,
            stone_deduction: 0.0,
            fluctuation_enabled: true,
            previous_price: 0.0,
        }
    }

    /// Manual override if set, else the latest scale reading.
    pub fn base_weight(&self) -> f64 {
        self.manual_weight.unwrap_or(self.live_weight)
    }

    /// Weight actually priced, after the stone-deduction rule.
    pub fn effective_weight(&self) -> f64 {
        pricing::effective_weight(self.mode, self.karat, self.base_weight(), self.stone_deduction)
    }

    pub fn stone_deduction_applies(&self) -> bool {
        self.mode == Mode::Buy && matches!(self.karat, Karat::K18 | Karat::K21)
    }

    /// Select a karat; the design follows the schedule (previous design if
    /// it still exists for the new karat, else the karat's default).
    pub fn select_karat(&mut self, karat: Karat, settings: &ManufacturingSettings) {
        self.karat = karat;
        self.design = pick_design(settings, karat, self.design.as_deref());
    }

    pub fn select_design(&mut self, design: impl Into<String>) {
        self.design = Some(design.into());
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if !self.stone_deduction_applies() {
            self.stone_deduction = 0.0;
        }
    }

    pub fn set_manual_weight(&mut self, weight: Option<f64>) {
        self.manual_weight = weight.filter(|w| *w >= 0.0);
    }

    /// Stone deduction, clamped to `[0, base weight]`.
    pub fn set_stone_deduction(&mut self, grams: f64) {
        self.stone_deduction = grams.max(0.0).min(self.base_weight());
    }
}

/// Keep the current design when the new karat's schedule still has it,
/// otherwise fall back to the karat default, then to the first design.
fn pick_design(
    settings: &ManufacturingSettings,
    karat: Karat,
    current: Option<&str>,
) -> Option<String> {
    let designs = settings.designs(karat);
    if let Some(current) = current {
        if designs.contains(&current) {
            return Some(current.to_string());
        }
    }
    let fallback = default_design_for(karat);
    if designs.contains(&fallback) {
        return Some(fallback.to_string());
    }
    designs.first().map(|design| design.to_string())
}

/// One display refresh: the computed total (None = placeholder), its
/// direction against the previous refresh, and the sell-mode detail
/// breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub total: Option<f64>,
    pub direction: Direction,
    pub breakdown: Option<SellBreakdown>,
}

/// Recompute the displayed price from the current state and settings.
///
/// Reads the fee schedule, discount, and sub-gram fee fresh from the store
/// so settings edits take effect on the next tick. Updates
/// `previous_price` only when a price was shown.
pub fn recompute(state: &mut AppState, store: &ConfigStore) -> PriceUpdate {
    let settings = store.manufacturing_settings();
    let weight = state.effective_weight();
    let spot = state.display_spot;
    let design = state.design.as_deref();

    let total = match state.mode {
        Mode::Sell => pricing::sell_price(
            spot,
            state.karat,
            design,
            weight,
            &settings,
            store.fixed_manufacturing_fee(),
        ),
        Mode::Buy => pricing::buy_price(spot, state.karat, weight, store.buy_discount()),
    };

    let breakdown = match state.mode {
        Mode::Sell => pricing::sell_breakdown(
            spot,
            state.karat,
            design,
            weight,
            &settings,
            store.fixed_manufacturing_fee(),
        ),
        Mode::Buy => None,
    };

    let direction = match total {
        Some(total) => pricing::price_direction(total, state.previous_price),
        None => Direction::Flat,
    };

    if let Some(total) = total {
        state.previous_price = total;
    } else {
        debug!("no price available, showing placeholder");
    }

    PriceUpdate {
        total,
        direction,
        breakdown,
    }
}
