//! Pure price computation.
//!
//! Everything here is side-effect free: the engine turns a spot quote, a
//! karat purity, a fee schedule, and a weight into a sell or buy price.
//! All I/O (feeds, config store) lives elsewhere.

use derive_more::Display;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Converts the feed's GOLD quote unit into a per-gram 24-karat price.
/// Fixed unit-conversion constant tied to the upstream feed's quoting
/// convention (troy-ounce-to-gram and currency scaling combined).
pub const QUOTE_TO_GRAM_24K: f64 = 121.5 / 1000.0;

/// Tax multiplier applied to sell prices for non-pure karats.
pub const SELL_TAX_RATE: f64 = 1.15;

/// Weights below this use the flat sub-gram fee instead of the range table.
pub const SUB_GRAM_THRESHOLD: f64 = 1.00;

/// Gold purity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum Karat {
    #[display("18")]
    K18,
    #[display("21")]
    K21,
    #[display("24")]
    K24,
}

impl Karat {
    /// Purity multiplier applied to the 24-karat per-gram baseline.
    pub fn purity(self) -> f64 {
        match self {
            Karat::K18 => 0.75,
            Karat::K21 => 0.875,
            Karat::K24 => 1.0,
        }
    }

    /// Sell-side tax multiplier. Pure 24K gold is tax exempt.
    pub fn tax_rate(self) -> f64 {
        match self {
            Karat::K24 => 1.0,
            _ => SELL_TAX_RATE,
        }
    }

    /// Key used in the persisted fee schedule ("18" / "21" / "24").
    pub fn key(self) -> &'static str {
        match self {
            Karat::K18 => "18",
            Karat::K21 => "21",
            Karat::K24 => "24",
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            18 => Some(Karat::K18),
            21 => Some(Karat::K21),
            24 => Some(Karat::K24),
            _ => None,
        }
    }
}

/// Whether the shop is selling to or buying from the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Mode {
    #[display("sell")]
    Sell,
    #[display("buy")]
    Buy,
}

/// One manufacturing-fee entry: a design's fee per gram over an inclusive
/// weight interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRange {
    pub design: String,
    pub from: f64,
    pub to: f64,
    pub fee: f64,
}

impl FeeRange {
    pub fn contains(&self, weight: f64) -> bool {
        weight >= self.from && weight <= self.to
    }
}

/// Fee schedule: karat key ("18" / "21" / "24") to its ordered fee ranges.
///
/// Within a karat, each design owns a sequence of non-overlapping ranges;
/// the core only ever reads this, mutation happens through the settings
/// surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManufacturingSettings(pub BTreeMap<String, Vec<FeeRange>>);

impl ManufacturingSettings {
    pub fn ranges(&self, karat: Karat) -> &[FeeRange] {
        self.0.get(karat.key()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Unique design names for a karat, in schedule order.
    pub fn designs(&self, karat: Karat) -> Vec<&str> {
        let mut seen = Vec::new();
        for range in self.ranges(karat) {
            if !seen.contains(&range.design.as_str()) {
                seen.push(range.design.as_str());
            }
        }
        seen
    }
}

/// Manufacturing fee per gram for (karat, design, weight).
///
/// Sub-gram weights always take the flat configured fee, ignoring design and
/// ranges. Otherwise the first matching range wins; with no match the
/// design's last-defined range is the fallback, and an unknown design costs
/// nothing.
pub fn manufacturing_fee(
    settings: &ManufacturingSettings,
    karat: Karat,
    design: Option<&str>,
    weight: f64,
    fixed_fee: f64,
) -> f64 {
    if weight < SUB_GRAM_THRESHOLD {
        return fixed_fee;
    }

    let Some(design) = design else { return 0.0 };
    let ranges = settings.ranges(karat);

    for range in ranges {
        if range.design == design && range.contains(weight) {
            return range.fee;
        }
    }

    ranges
        .iter()
        .rev()
        .find(|range| range.design == design)
        .map(|range| range.fee)
        .unwrap_or(0.0)
}

/// Per-gram 24K baseline for a raw spot quote.
pub fn price_24k(spot: f64) -> f64 {
    spot * QUOTE_TO_GRAM_24K
}

/// Per-gram value of the selected karat.
pub fn gold_value_per_gram(spot: f64, karat: Karat) -> f64 {
    price_24k(spot) * karat.purity()
}

/// Sell price for a piece.
///
/// Sub-gram weights apply the fee as a flat add-on
/// (`gold_value * weight + fee`); at or above one gram the fee is per gram
/// (`(gold_value + fee) * weight`). Tax applies last.
///
/// Returns `None` when no price can be shown (non-positive weight or spot).
pub fn sell_price(
    spot: f64,
    karat: Karat,
    design: Option<&str>,
    weight: f64,
    settings: &ManufacturingSettings,
    fixed_fee: f64,
) -> Option<f64> {
    if weight <= 0.0 || spot <= 0.0 {
        return None;
    }

    let gold_value = gold_value_per_gram(spot, karat);
    let fee = manufacturing_fee(settings, karat, design, weight, fixed_fee);

    let before_tax = if weight < SUB_GRAM_THRESHOLD {
        gold_value * weight + fee
    } else {
        (gold_value + fee) * weight
    };

    Some(before_tax * karat.tax_rate())
}

/// Buy price for a piece: per-gram value minus the per-gram discount, no
/// manufacturing fee, no tax. Weight is expected to already be net of any
/// stone deduction.
pub fn buy_price(spot: f64, karat: Karat, weight: f64, discount: f64) -> Option<f64> {
    if weight <= 0.0 || spot <= 0.0 {
        return None;
    }

    Some((gold_value_per_gram(spot, karat) - discount) * weight)
}

/// Effective weight after the stone deduction rule.
///
/// Deduction applies only when buying 18K or 21K pieces (stones are not
/// paid for); it never drives the weight below zero.
pub fn effective_weight(mode: Mode, karat: Karat, base_weight: f64, stone_deduction: f64) -> f64 {
    if mode == Mode::Buy && matches!(karat, Karat::K18 | Karat::K21) {
        (base_weight - stone_deduction).max(0.0)
    } else {
        base_weight
    }
}

/// Display-layer noise: bounded uniform jitter applied once per incoming
/// tick against the authoritative spot, never against a previously
/// fluctuated value. Not clamped at zero.
pub fn apply_fluctuation(base: f64, range: f64) -> f64 {
    let noise: f64 = rand::rng().random_range(-1.0..=1.0);
    base + noise * range
}

/// Per-gram breakdown shown by the detail display in sell mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellBreakdown {
    pub gold_value_per_gram: f64,
    pub fee_per_gram: f64,
    pub cost_per_gram: f64,
    pub vat: f64,
}

/// Detail breakdown for the sell display. Uses the per-gram fee for the
/// given weight; VAT is the tax portion on the pre-tax total.
pub fn sell_breakdown(
    spot: f64,
    karat: Karat,
    design: Option<&str>,
    weight: f64,
    settings: &ManufacturingSettings,
    fixed_fee: f64,
) -> Option<SellBreakdown> {
    if weight <= 0.0 || spot <= 0.0 {
        return None;
    }

    let gold_value = gold_value_per_gram(spot, karat);
    let fee = manufacturing_fee(settings, karat, design, weight, fixed_fee);
    let cost_per_gram = gold_value + fee;
    let before_tax = cost_per_gram * weight;
    let vat = before_tax * (karat.tax_rate() - 1.0);

    Some(SellBreakdown {
        gold_value_per_gram: gold_value,
        fee_per_gram: fee,
        cost_per_gram,
        vat,
    })
}

/// Direction of the displayed price relative to the previous update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[display("up")]
    Up,
    #[display("down")]
    Down,
    #[display("flat")]
    Flat,
}

/// Dead-band for direction classification; sub-millesimal moves read flat.
const DIRECTION_DEAD_BAND: f64 = 0.001;

pub fn price_direction(current: f64, previous: f64) -> Direction {
    let difference = current - previous;
    if difference > DIRECTION_DEAD_BAND {
        Direction::Up
    } else if difference < -DIRECTION_DEAD_BAND {
        Direction::Down
    } else {
        Direction::Flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::default_manufacturing_settings;

    fn settings_with(karat: Karat, ranges: Vec<FeeRange>) -> ManufacturingSettings {
        let mut map = BTreeMap::new();
        map.insert(karat.key().to_string(), ranges);
        ManufacturingSettings(map)
    }

    fn range(design: &str, from: f64, to: f64, fee: f64) -> FeeRange {
        FeeRange {
            design: design.to_string(),
            from,
            to,
            fee,
        }
    }

    #[test]
    fn test_sell_price_worked_example_18k() {
        // spot=3400, 18K, fee=100 at 8g: price24K = 413.1,
        // goldValue = 309.825, cost/gram = 409.825, total = 409.825 * 8 * 1.15
        let settings = settings_with(Karat::K18, vec![range("italian", 5.01, 10.0, 100.0)]);
        let price = sell_price(3400.0, Karat::K18, Some("italian"), 8.0, &settings, 500.0)
            .expect("price available");

        let expected = (3400.0 * QUOTE_TO_GRAM_24K * 0.75 + 100.0) * 8.0 * 1.15;
        assert!((price - expected).abs() < 0.01);
    }

    #[test]
    fn test_sell_price_worked_example_24k_no_tax() {
        // spot=3400, 24K, 3g, fee=80: goldValue=413.1, cost/gram=493.1,
        // total = 493.1 * 3 * 1.0
        let settings = settings_with(Karat::K24, vec![range("local", 2.51, 5.0, 80.0)]);
        let price = sell_price(3400.0, Karat::K24, Some("local"), 3.0, &settings, 500.0)
            .expect("price available");

        let expected = (3400.0 * QUOTE_TO_GRAM_24K + 80.0) * 3.0;
        assert!((price - expected).abs() < 0.01);
    }

    #[test]
    fn test_sell_price_formula_all_karats() {
        for (karat, purity, tax) in [
            (Karat::K18, 0.75, 1.15),
            (Karat::K21, 0.875, 1.15),
            (Karat::K24, 1.0, 1.0),
        ] {
            let settings = settings_with(karat, vec![range("local", 1.0, 100.0, 60.0)]);
            let price = sell_price(2000.0, karat, Some("local"), 4.0, &settings, 500.0).unwrap();
            let expected = (2000.0 * QUOTE_TO_GRAM_24K * purity + 60.0) * 4.0 * tax;
            assert!(
                (price - expected).abs() < 1e-9,
                "karat {} mismatch: {} vs {}",
                karat,
                price,
                expected
            );
        }
    }

    #[test]
    fn test_sub_gram_fixed_fee_not_scaled_by_weight() {
        let settings = settings_with(Karat::K21, vec![range("local", 1.0, 10.0, 80.0)]);
        let fixed_fee = 500.0;
        let weight = 0.5;

        let price = sell_price(3400.0, Karat::K21, Some("local"), weight, &settings, fixed_fee)
            .expect("price available");

        let gold_value = 3400.0 * QUOTE_TO_GRAM_24K * 0.875;
        let expected = (gold_value * weight + fixed_fee) * 1.15;
        assert!((price - expected).abs() < 1e-9);

        // And the flat fee ignores the range table entirely.
        let fee = manufacturing_fee(&settings, Karat::K21, Some("local"), weight, fixed_fee);
        assert_eq!(fee, fixed_fee);
    }

    #[test]
    fn test_buy_price_no_fee_no_tax() {
        let price = buy_price(3400.0, Karat::K21, 10.0, 20.0).expect("price available");
        let expected = (3400.0 * QUOTE_TO_GRAM_24K * 0.875 - 20.0) * 10.0;
        assert!((price - expected).abs() < 1e-9);
    }

    #[test]
    fn test_no_price_for_non_positive_inputs() {
        let settings = default_manufacturing_settings();
        assert_eq!(sell_price(0.0, Karat::K18, None, 5.0, &settings, 500.0), None);
        assert_eq!(sell_price(3400.0, Karat::K18, None, 0.0, &settings, 500.0), None);
        assert_eq!(sell_price(-1.0, Karat::K18, None, 5.0, &settings, 500.0), None);
        assert_eq!(buy_price(3400.0, Karat::K24, -2.0, 20.0), None);
        assert_eq!(buy_price(0.0, Karat::K24, 2.0, 20.0), None);
    }

    #[test]
    fn test_fee_range_lookup() {
        let settings = settings_with(
            Karat::K18,
            vec![
                range("italian", 1.0, 2.0, 200.0),
                range("italian", 2.01, 3.0, 175.0),
                range("local", 1.0, 2.0, 180.0),
            ],
        );

        // Unique matching range wins.
        assert_eq!(
            manufacturing_fee(&settings, Karat::K18, Some("italian"), 2.5, 500.0),
            175.0
        );
        // Inclusive bounds.
        assert_eq!(
            manufacturing_fee(&settings, Karat::K18, Some("italian"), 2.0, 500.0),
            200.0
        );
        // No match: last-defined range for the design is the fallback.
        assert_eq!(
            manufacturing_fee(&settings, Karat::K18, Some("italian"), 50.0, 500.0),
            175.0
        );
        // Unknown design: zero.
        assert_eq!(
            manufacturing_fee(&settings, Karat::K18, Some("swiss"), 2.5, 500.0),
            0.0
        );
        // No design selected: zero.
        assert_eq!(manufacturing_fee(&settings, Karat::K18, None, 2.5, 500.0), 0.0);
    }

    #[test]
    fn test_effective_weight_stone_deduction() {
        // Buy mode, 18/21K: deduction applies, clamped at zero.
        assert_eq!(effective_weight(Mode::Buy, Karat::K18, 10.0, 2.0), 8.0);
        assert_eq!(effective_weight(Mode::Buy, Karat::K21, 3.0, 5.0), 0.0);
        // 24K never deducts.
        assert_eq!(effective_weight(Mode::Buy, Karat::K24, 10.0, 2.0), 10.0);
        // Sell mode never deducts.
        assert_eq!(effective_weight(Mode::Sell, Karat::K18, 10.0, 2.0), 10.0);
    }

    #[test]
    fn test_fluctuation_bounded_and_non_compounding() {
        let base = 3400.0;
        let range = 1.5;
        for _ in 0..200 {
            let noisy = apply_fluctuation(base, range);
            assert!(noisy >= base - range && noisy <= base + range);
        }
        // Zero range is the identity.
        assert_eq!(apply_fluctuation(base, 0.0), base);
    }

    #[test]
    fn test_sell_breakdown() {
        let settings = settings_with(Karat::K18, vec![range("italian", 5.01, 10.0, 100.0)]);
        let breakdown =
            sell_breakdown(3400.0, Karat::K18, Some("italian"), 8.0, &settings, 500.0).unwrap();

        let gold_value = 3400.0 * QUOTE_TO_GRAM_24K * 0.75;
        assert!((breakdown.gold_value_per_gram - gold_value).abs() < 1e-9);
        assert_eq!(breakdown.fee_per_gram, 100.0);
        assert!((breakdown.cost_per_gram - (gold_value + 100.0)).abs() < 1e-9);
        assert!((breakdown.vat - (gold_value + 100.0) * 8.0 * 0.15).abs() < 1e-9);

        // 24K carries no VAT.
        let settings24 = settings_with(Karat::K24, vec![range("local", 1.0, 5.0, 80.0)]);
        let breakdown24 =
            sell_breakdown(3400.0, Karat::K24, Some("local"), 3.0, &settings24, 500.0).unwrap();
        assert_eq!(breakdown24.vat, 0.0);
    }

    #[test]
    fn test_designs_unique_in_order() {
        let settings = settings_with(
            Karat::K21,
            vec![
                range("italian", 1.0, 2.0, 200.0),
                range("local", 1.0, 2.0, 180.0),
                range("italian", 2.01, 3.0, 175.0),
                range("bracelet", 0.0, 100.0, 40.0),
            ],
        );
        assert_eq!(
            settings.designs(Karat::K21),
            vec!["italian", "local", "bracelet"]
        );
        assert!(settings.designs(Karat::K24).is_empty());
    }

    #[test]
    fn test_price_direction() {
        assert_eq!(price_direction(101.0, 100.0), Direction::Up);
        assert_eq!(price_direction(99.0, 100.0), Direction::Down);
        assert_eq!(price_direction(100.0, 100.0), Direction::Flat);
        assert_eq!(price_direction(100.0005, 100.0), Direction::Flat);
    }

    #[test]
    fn test_karat_parsing() {
        assert_eq!(Karat::from_u32(18), Some(Karat::K18));
        assert_eq!(Karat::from_u32(21), Some(Karat::K21));
        assert_eq!(Karat::from_u32(24), Some(Karat::K24));
        assert_eq!(Karat::from_u32(22), None);
        assert_eq!(Karat::K21.key(), "21");
        assert_eq!(Karat::K18.to_string(), "18");
    }
}
