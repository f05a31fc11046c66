// In crates/signal-store/src/lib.rs

//! Durable per-session cache for the latest signal and the user-tunable
//! risk/ATR settings.
//!
//! Values live in a flat string-keyed map guarded by a single lock and are
//! flushed to a JSON file on every write. Readers and writers do not
//! coordinate beyond that lock: the last write wins.

use core_types::TradeSignal;
use risk::RiskSettings;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub mod error;
pub mod keys;

pub use error::{Error, Result};

type Entries = BTreeMap<String, Value>;

/// Thread-safe, file-backed key/value store.
///
/// Every write flushes to disk with blocking file I/O while holding the
/// lock. Async callers should write from `tokio::task::spawn_blocking`.
#[derive(Clone, Debug)]
pub struct SignalStore {
    path: Option<PathBuf>,
    entries: Arc<RwLock<Entries>>,
}

impl SignalStore {
    /// Opens the store at `path`, loading any existing contents.
    ///
    /// A missing file is not an error; it is created on the first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Entries::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            Entries::new()
        };
        tracing::info!(path = %path.display(), keys = entries.len(), "Signal store opened.");
        Ok(Self {
            path: Some(path),
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Arc::new(RwLock::new(Entries::new())),
        }
    }

    /// Reads and deserializes the value under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let entries = self.entries.read().map_err(|_| Error::Poisoned)?;
        match entries.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key` and flushes the store.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut entries = self.entries.write().map_err(|_| Error::Poisoned)?;
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| Error::Poisoned)?;
        let removed = entries.remove(key).is_some();
        if removed {
            self.flush(&entries)?;
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| Error::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    // --- Typed accessors ---

    /// The most recent signal handed to the execution side.
    pub fn last_signal(&self) -> Result<Option<TradeSignal>> {
        self.get(keys::LAST_SIGNAL)
    }

    pub fn set_last_signal(&self, signal: &TradeSignal) -> Result<()> {
        self.set(keys::LAST_SIGNAL, signal)
    }

    /// The ATR currently applied to TP/SL computation.
    pub fn atr(&self) -> Result<Option<Decimal>> {
        let entries = self.entries.read().map_err(|_| Error::Poisoned)?;
        Ok(entries.get(keys::ATR).and_then(decimal_from))
    }

    pub fn set_atr(&self, atr: Decimal) -> Result<()> {
        self.set(keys::ATR, &atr)
    }

    /// Assembles the risk settings from their individual keys.
    ///
    /// Missing or unreadable keys fall back to `defaults`.
    pub fn risk_settings(&self, defaults: &RiskSettings) -> Result<RiskSettings> {
        let entries = self.entries.read().map_err(|_| Error::Poisoned)?;
        Ok(read_settings(&entries, defaults))
    }

    /// Applies `update` to the current settings, validates the result and
    /// persists every key under one write lock.
    pub fn update_risk_settings<F>(&self, defaults: &RiskSettings, update: F) -> Result<RiskSettings>
    where
        F: FnOnce(&mut RiskSettings),
    {
        let mut entries = self.entries.write().map_err(|_| Error::Poisoned)?;
        let mut settings = read_settings(&entries, defaults);
        update(&mut settings);
        settings.validate()?;

        let decimals = [
            (keys::LEVERAGE, settings.leverage),
            (keys::MAINTENANCE_MARGIN_RATE, settings.maintenance_margin_rate),
            (keys::LIQUIDATION_BUFFER_ATR, settings.liquidation_buffer_atr_multiple),
            (keys::MAX_NOTIONAL, settings.max_notional),
            (keys::RISK_PERCENT, settings.risk_percent_of_balance),
            (keys::TAKE_PROFIT_MULTIPLE, settings.atr_take_profit_multiple),
            (keys::STOP_LOSS_MULTIPLE, settings.atr_stop_loss_multiple),
            (keys::ENTRY_OFFSET_RATIO, settings.entry_offset_ratio),
        ];
        for (key, value) in decimals {
            entries.insert(key.to_string(), serde_json::to_value(value)?);
        }
        entries.insert(keys::ALLOW_UNSAFE.to_string(), Value::Bool(settings.allow_unsafe));
        entries.insert(
            keys::REJECT_CROSSED.to_string(),
            Value::Bool(settings.reject_crossed_targets),
        );
        self.flush(&entries)?;

        tracing::info!(?settings, "Risk settings updated.");
        Ok(settings)
    }

    fn flush(&self, entries: &Entries) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn read_settings(entries: &Entries, defaults: &RiskSettings) -> RiskSettings {
    let decimal = |key: &str, fallback: Decimal| {
        entries.get(key).and_then(decimal_from).unwrap_or(fallback)
    };
    let flag = |key: &str, fallback: bool| entries.get(key).and_then(flag_from).unwrap_or(fallback);

    RiskSettings {
        leverage: decimal(keys::LEVERAGE, defaults.leverage),
        maintenance_margin_rate: decimal(
            keys::MAINTENANCE_MARGIN_RATE,
            defaults.maintenance_margin_rate,
        ),
        liquidation_buffer_atr_multiple: decimal(
            keys::LIQUIDATION_BUFFER_ATR,
            defaults.liquidation_buffer_atr_multiple,
        ),
        max_notional: decimal(keys::MAX_NOTIONAL, defaults.max_notional),
        risk_percent_of_balance: decimal(keys::RISK_PERCENT, defaults.risk_percent_of_balance),
        allow_unsafe: flag(keys::ALLOW_UNSAFE, defaults.allow_unsafe),
        atr_take_profit_multiple: decimal(
            keys::TAKE_PROFIT_MULTIPLE,
            defaults.atr_take_profit_multiple,
        ),
        atr_stop_loss_multiple: decimal(keys::STOP_LOSS_MULTIPLE, defaults.atr_stop_loss_multiple),
        entry_offset_ratio: decimal(keys::ENTRY_OFFSET_RATIO, defaults.entry_offset_ratio),
        reject_crossed_targets: flag(keys::REJECT_CROSSED, defaults.reject_crossed_targets),
    }
}

// Numbers may have been written as JSON numbers or as strings.
fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

// Flags may be booleans or the "1"/"0" strings the browser store used.
fn flag_from(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Side;
    use rust_decimal_macros::dec;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("signal-store-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let store = SignalStore::in_memory();
        let defaults = RiskSettings::default();
        assert_eq!(store.risk_settings(&defaults).unwrap(), defaults);
        assert_eq!(store.atr().unwrap(), None);
        assert!(store.last_signal().unwrap().is_none());
    }

    #[test]
    fn test_reads_browser_style_values() {
        let store = SignalStore::in_memory();
        store.set(keys::LEVERAGE, &"10").unwrap();
        store.set(keys::ALLOW_UNSAFE, &"1").unwrap();
        store.set(keys::MAX_NOTIONAL, &250.5).unwrap();
        store.set(keys::RISK_PERCENT, &"not a number").unwrap();

        let settings = store.risk_settings(&RiskSettings::default()).unwrap();
        assert_eq!(settings.leverage, dec!(10));
        assert!(settings.allow_unsafe);
        assert_eq!(settings.max_notional, dec!(250.5));
        assert_eq!(settings.risk_percent_of_balance, dec!(2.5));
    }

    #[test]
    fn test_update_validates_before_writing() {
        let store = SignalStore::in_memory();
        let defaults = RiskSettings::default();

        let updated = store
            .update_risk_settings(&defaults, |s| s.leverage = dec!(8))
            .unwrap();
        assert_eq!(updated.leverage, dec!(8));

        let rejected = store.update_risk_settings(&defaults, |s| s.leverage = dec!(0.5));
        assert!(matches!(rejected, Err(Error::InvalidSettings(_))));
        assert_eq!(store.risk_settings(&defaults).unwrap().leverage, dec!(8));
    }

    #[test]
    fn test_last_write_wins() {
        let store = SignalStore::in_memory();
        store.set_atr(dec!(1.5)).unwrap();
        store.set_atr(dec!(2.25)).unwrap();
        assert_eq!(store.atr().unwrap(), Some(dec!(2.25)));
    }

    #[test]
    fn test_persists_across_reopen() {
        let path = temp_path();
        {
            let store = SignalStore::open(&path).unwrap();
            let signal = TradeSignal::new(Side::Short, Some(dec!(150.25)), dec!(0.8), 42, "2").unwrap();
            store.set_last_signal(&signal).unwrap();
            store
                .update_risk_settings(&RiskSettings::default(), |s| s.allow_unsafe = true)
                .unwrap();
        }

        let reopened = SignalStore::open(&path).unwrap();
        let signal = reopened.last_signal().unwrap().unwrap();
        assert_eq!(signal.side(), Side::Short);
        assert_eq!(signal.price(), Some(dec!(150.25)));
        assert!(reopened.risk_settings(&RiskSettings::default()).unwrap().allow_unsafe);

        assert!(reopened.remove(keys::LAST_SIGNAL).unwrap());
        assert!(!reopened.remove(keys::LAST_SIGNAL).unwrap());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_clones_share_state() {
        let store = SignalStore::in_memory();
        let clone = store.clone();
        clone.set_atr(dec!(3)).unwrap();
        assert_eq!(store.atr().unwrap(), Some(dec!(3)));
        assert_eq!(store.keys().unwrap(), vec![keys::ATR.to_string()]);
    }
}
