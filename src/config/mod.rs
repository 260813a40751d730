//! Typed accessors over the persistent key-value configuration store.
//!
//! The store is a flat JSON object on disk. Every getter carries an embedded
//! default: a missing file, a missing key, or a value of the wrong shape is
//! a config fault that logs a warning and yields the default, never an
//! error to the caller. Writes are best-effort.

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Fault;
use crate::pricing::ManufacturingSettings;

pub mod defaults;

use defaults::{
    default_manufacturing_settings, DEFAULT_BUY_DISCOUNT, DEFAULT_CR_NUMBER,
    DEFAULT_FIXED_MANUFACTURING_FEE, DEFAULT_FLUCTUATION_RANGE, DEFAULT_VAT_NUMBER,
};

/// Storage keys. Kept stable so an existing settings file survives upgrades.
pub mod keys {
    pub const MANUFACTURING_SETTINGS: &str = "goldManufacturingSettings";
    pub const BUY_DISCOUNT: &str = "buyDiscount";
    pub const FLUCTUATION_RANGE: &str = "fluctuationRange";
    pub const FIXED_MANUFACTURING_FEE: &str = "fixedManufacturingFee";
    pub const CR_NUMBER: &str = "crNumber";
    pub const VAT_NUMBER: &str = "vatNumber";
    pub const OFFLINE_GOLD_PRICE: &str = "offline_gold_price";
}

/// Persistent key-value configuration store.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl ConfigStore {
    /// Open the store at `path`, loading any existing values. A missing or
    /// corrupt file starts empty (defaults apply until the first write).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(error) => {
                    let fault = Fault::Config(format!("{}: {error}", path.display()));
                    warn!(%fault, "corrupt settings file, using defaults");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let values = self.values.lock();
        let value = values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                let fault = Fault::Config(format!("{key}: {error}"));
                warn!(%fault, "unreadable setting, using default");
                None
            }
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_value(value) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(key, %error, "failed to serialize setting");
                return;
            }
        };

        let snapshot = {
            let mut values = self.values.lock();
            values.insert(key.to_string(), serialized);
            values.clone()
        };

        // Best-effort persistence; an unwritable disk only loses durability.
        match serde_json::to_string_pretty(&snapshot) {
            Ok(raw) => {
                if let Err(error) = std::fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), %error, "failed to persist settings");
                }
            }
            Err(error) => warn!(%error, "failed to encode settings"),
        }
    }

    pub fn manufacturing_settings(&self) -> ManufacturingSettings {
        self.get(keys::MANUFACTURING_SETTINGS)
            .unwrap_or_else(default_manufacturing_settings)
    }

    pub fn set_manufacturing_settings(&self, settings: &ManufacturingSettings) {
        self.set(keys::MANUFACTURING_SETTINGS, settings);
    }

    pub fn buy_discount(&self) -> f64 {
        self.get(keys::BUY_DISCOUNT).unwrap_or(DEFAULT_BUY_DISCOUNT)
    }

    pub fn set_buy_discount(&self, value: f64) {
        self.set(keys::BUY_DISCOUNT, &value);
    }

    pub fn fluctuation_range(&self) -> f64 {
        self.get(keys::FLUCTUATION_RANGE)
            .unwrap_or(DEFAULT_FLUCTUATION_RANGE)
    }

    pub fn set_fluctuation_range(&self, value: f64) {
        self.set(keys::FLUCTUATION_RANGE, &value);
    }

    pub fn fixed_manufacturing_fee(&self) -> f64 {
        self.get(keys::FIXED_MANUFACTURING_FEE)
            .unwrap_or(DEFAULT_FIXED_MANUFACTURING_FEE)
    }

    pub fn set_fixed_manufacturing_fee(&self, value: f64) {
        self.set(keys::FIXED_MANUFACTURING_FEE, &value);
    }

    pub fn cr_number(&self) -> String {
        self.get(keys::CR_NUMBER)
            .unwrap_or_else(|| DEFAULT_CR_NUMBER.to_string())
    }

    pub fn set_cr_number(&self, value: &str) {
        self.set(keys::CR_NUMBER, &value);
    }

    pub fn vat_number(&self) -> String {
        self.get(keys::VAT_NUMBER)
            .unwrap_or_else(|| DEFAULT_VAT_NUMBER.to_string())
    }

    pub fn set_vat_number(&self, value: &str) {
        self.set(keys::VAT_NUMBER, &value);
    }

    /// Last bid seen while the market was closed, shown on the next startup
    /// before any live data arrives.
    pub fn offline_gold_price(&self) -> Option<f64> {
        self.get(keys::OFFLINE_GOLD_PRICE)
    }

    pub fn set_offline_gold_price(&self, value: f64) {
        self.set(keys::OFFLINE_GOLD_PRICE, &value);
    }
}
