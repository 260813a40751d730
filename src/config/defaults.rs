//! Embedded defaults for every persisted setting.
//!
//! The fee schedule mirrors the shop's stock categories: per-karat design
//! tables with weight ranges in grams and fees in currency per gram. Any
//! config read failure falls back to these values.

use crate::pricing::{FeeRange, Karat, ManufacturingSettings};
use std::collections::BTreeMap;

pub const DEFAULT_BUY_DISCOUNT: f64 = 20.0;
pub const DEFAULT_FLUCTUATION_RANGE: f64 = 1.0;
pub const DEFAULT_FIXED_MANUFACTURING_FEE: f64 = 500.0;
pub const DEFAULT_CR_NUMBER: &str = "2053175911";
pub const DEFAULT_VAT_NUMBER: &str = "2053175911";

/// Design selected when switching to a karat whose previous design does not
/// exist in its schedule.
pub fn default_design_for(karat: Karat) -> &'static str {
    match karat {
        Karat::K18 => "italian",
        Karat::K21 => "local",
        Karat::K24 => "local",
    }
}

fn range(design: &str, from: f64, to: f64, fee: f64) -> FeeRange {
    FeeRange {
        design: design.to_string(),
        from,
        to,
        fee,
    }
}

/// Factory-default manufacturing fee schedule.
pub fn default_manufacturing_settings() -> ManufacturingSettings {
    let mut map = BTreeMap::new();

    map.insert(
        "18".to_string(),
        vec![
            range("italian", 1.00, 2.00, 200.0),
            range("italian", 2.01, 3.00, 175.0),
            range("italian", 3.01, 4.00, 150.0),
            range("italian", 4.01, 5.00, 125.0),
            range("italian", 5.01, 10.00, 100.0),
            range("local", 1.00, 2.00, 180.0),
            range("local", 2.01, 3.00, 160.0),
            range("local", 3.01, 4.00, 130.0),
            range("local", 4.01, 5.00, 100.0),
            range("local", 5.01, 10.00, 80.0),
        ],
    );

    map.insert(
        "21".to_string(),
        vec![
            range("italian", 1.00, 2.00, 200.0),
            range("italian", 2.01, 3.00, 175.0),
            range("italian", 3.01, 4.00, 150.0),
            range("italian", 4.01, 5.00, 125.0),
            range("italian", 5.01, 10.00, 100.0),
            range("local", 1.00, 2.00, 180.0),
            range("local", 2.01, 3.00, 160.0),
            range("local", 3.01, 4.00, 130.0),
            range("local", 4.01, 5.00, 100.0),
            range("local", 5.01, 10.00, 80.0),
            range("bracelet", 0.00, 100.00, 40.0),
        ],
    );

    map.insert(
        "24".to_string(),
        vec![
            range("local", 0.98, 2.50, 100.0),
            range("local", 2.51, 5.00, 80.0),
            range("swiss", 0.98, 2.50, 150.0),
            range("swiss", 2.51, 5.00, 130.0),
        ],
    );

    ManufacturingSettings(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_covers_all_karats() {
        let settings = default_manufacturing_settings();
        for karat in [Karat::K18, Karat::K21, Karat::K24] {
            assert!(
                !settings.ranges(karat).is_empty(),
                "karat {} has no default ranges",
                karat
            );
        }
    }

    #[test]
    fn test_default_design_exists_in_schedule() {
        let settings = default_manufacturing_settings();
        for karat in [Karat::K18, Karat::K21, Karat::K24] {
            let designs = settings.designs(karat);
            assert!(
                designs.contains(&default_design_for(karat)),
                "default design for {} missing from schedule",
                karat
            );
        }
    }

    #[test]
    fn test_ranges_non_overlapping_per_design() {
        let settings = default_manufacturing_settings();
        for karat in [Karat::K18, Karat::K21, Karat::K24] {
            for design in settings.designs(karat) {
                let ranges: Vec<_> = settings
                    .ranges(karat)
                    .iter()
                    .filter(|r| r.design == design)
                    .collect();
                for window in ranges.windows(2) {
                    assert!(
                        window[0].to < window[1].from,
                        "overlapping ranges for {} / {}",
                        karat,
                        design
                    );
                }
            }
        }
    }
}
