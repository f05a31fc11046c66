// In crates/risk/src/types.rs

use crate::{Error, Result};
use core_types::Side;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// User-tunable risk settings.
///
/// These are read on every computation; there is no snapshot, so a change
/// made between two signals applies to the second one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RiskSettings {
    /// Notional exposure multiple of the account balance.
    #[serde(with = "rust_decimal::serde::float")]
    pub leverage: Decimal,
    /// Maintenance margin rate (e.g., 0.005 for 0.5%).
    #[serde(with = "rust_decimal::serde::float")]
    pub maintenance_margin_rate: Decimal,
    /// Minimum gap kept between stop and liquidation, in ATRs.
    #[serde(with = "rust_decimal::serde::float")]
    pub liquidation_buffer_atr_multiple: Decimal,
    /// Hard notional cap in quote currency. Zero disables the cap.
    #[serde(with = "rust_decimal::serde::float")]
    pub max_notional: Decimal,
    /// Percentage of the balance risked between entry and stop.
    #[serde(with = "rust_decimal::serde::float")]
    pub risk_percent_of_balance: Decimal,
    /// Submit even when the stop sits too close to liquidation.
    pub allow_unsafe: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub atr_take_profit_multiple: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub atr_stop_loss_multiple: Decimal,
    /// Shifts the entry against the trade (long up, short down) as a
    /// fraction of the entry price, to improve fill odds. Zero disables it.
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_offset_ratio: Decimal,
    /// Fail the computation on crossed TP/SL instead of swapping the fields.
    pub reject_crossed_targets: bool,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            leverage: dec!(5),
            maintenance_margin_rate: dec!(0.005),
            liquidation_buffer_atr_multiple: dec!(0.5),
            max_notional: Decimal::ZERO,
            risk_percent_of_balance: dec!(2.5),
            allow_unsafe: false,
            atr_take_profit_multiple: dec!(2.0),
            atr_stop_loss_multiple: dec!(1.5),
            entry_offset_ratio: Decimal::ZERO,
            reject_crossed_targets: false,
        }
    }
}

impl RiskSettings {
    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.leverage < Decimal::ONE {
            return Err(Error::InvalidParameters(format!(
                "leverage must be >= 1, got {}",
                self.leverage
            )));
        }
        if self.risk_percent_of_balance <= Decimal::ZERO {
            return Err(Error::InvalidParameters(format!(
                "risk percent must be > 0, got {}",
                self.risk_percent_of_balance
            )));
        }
        if self.atr_take_profit_multiple <= Decimal::ZERO
            || self.atr_stop_loss_multiple <= Decimal::ZERO
        {
            return Err(Error::InvalidParameters(
                "ATR take-profit and stop-loss multiples must be > 0".to_string(),
            ));
        }
        let non_negative = [
            ("maintenance margin rate", self.maintenance_margin_rate),
            ("liquidation buffer", self.liquidation_buffer_atr_multiple),
            ("max notional", self.max_notional),
            ("entry offset ratio", self.entry_offset_ratio),
        ];
        for (name, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(Error::InvalidParameters(format!(
                    "{name} must be >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Decimal places of the destination fields, read from their current
/// values. `None` means no reference is available and the 3-decimal
/// fallback applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldPrecision {
    pub price: Option<u32>,
    pub take_profit: Option<u32>,
    pub stop_loss: Option<u32>,
    pub quantity: Option<u32>,
}

/// The execution decision attached to a computed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Stop sits comfortably inside the liquidation window.
    Safe,
    /// Too close to liquidation, but the user allowed unsafe orders.
    Unsafe,
    /// Too close to liquidation; the order must not be submitted.
    Rejected,
}

/// Order parameters derived from a signal. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedOrder {
    pub side: Side,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry: Decimal,
    /// Value destined for the take-profit field (after any swap).
    #[serde(with = "rust_decimal::serde::float")]
    pub take_profit: Decimal,
    /// Value destined for the stop-loss field (after any swap).
    #[serde(with = "rust_decimal::serde::float")]
    pub stop_loss: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity_by_risk: Decimal,
    /// `None` when the entry gives no leverage bound.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub max_quantity_by_leverage: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub risk_reward_ratio: Decimal,
    /// `None` when leverage is 1x or less.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub liquidation_estimate: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub distance_to_liquidation: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub distance_to_stop: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub safety_buffer: Decimal,
    pub too_close_to_liquidation: bool,
    /// The TP/SL values landed in each other's fields.
    pub fields_swapped: bool,
    pub verdict: Verdict,
    pub notes: Vec<String>,
}

impl ComputedOrder {
    /// Whether the caller may submit this order.
    pub fn is_executable(&self) -> bool {
        self.verdict != Verdict::Rejected
    }
}
