// In crates/events/src/notification.rs

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use core_types::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of records sent to the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OpenOperation,
    TradeClosed,
    OrderPending,
    OrderCanceled,
    OrderConfirmed,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 5] = [
        NotificationKind::OpenOperation,
        NotificationKind::TradeClosed,
        NotificationKind::OrderPending,
        NotificationKind::OrderCanceled,
        NotificationKind::OrderConfirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OpenOperation => "open_operation",
            NotificationKind::TradeClosed => "trade_closed",
            NotificationKind::OrderPending => "order_pending",
            NotificationKind::OrderCanceled => "order_canceled",
            NotificationKind::OrderConfirmed => "order_confirmed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                Error::Invalid(format!(
                    "Field 'type' should be one of: {}",
                    allowed.join(" / ")
                ))
            })
    }
}

/// A structured record describing a trade or order lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Epoch milliseconds.
    pub ts: i64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub entry_price: Option<Decimal>,
    #[serde(
        rename = "tp",
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub take_profit: Option<Decimal>,
    #[serde(
        rename = "sl",
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub stop_loss: Option<Decimal>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub exit_price: Option<Decimal>,
    #[serde(
        rename = "qty",
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub quantity: Option<Decimal>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub leverage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub atr: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Realized result of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitAndLoss {
    /// Absolute result; `None` without a quantity.
    pub pnl: Option<Decimal>,
    /// Move relative to the entry, signed by the trade direction.
    pub pnl_percent: Option<Decimal>,
}

impl Notification {
    /// A bare record of `kind` with every optional field empty.
    pub fn new(kind: NotificationKind, ts: i64) -> Self {
        Self {
            kind,
            side: None,
            symbol: None,
            ts,
            entry_price: None,
            take_profit: None,
            stop_loss: None,
            exit_price: None,
            quantity: None,
            leverage: None,
            note: None,
            atr: None,
            client_id: None,
        }
    }

    /// `open_operation` records must name a side.
    pub fn validate(&self) -> Result<()> {
        if self.kind == NotificationKind::OpenOperation && self.side.is_none() {
            return Err(Error::Invalid(
                "For 'open_operation' the field 'side' must be 'long' or 'short'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts)
    }

    /// Reward over risk, when entry, TP and SL are all present and the
    /// stop does not sit on the entry.
    pub fn risk_reward(&self) -> Option<Decimal> {
        let (entry, tp, sl) = (self.entry_price?, self.take_profit?, self.stop_loss?);
        let risk = (entry - sl).abs();
        if risk.is_zero() {
            return None;
        }
        Some((tp - entry).abs() / risk)
    }

    /// Profit and loss between entry and exit. Sides other than short are
    /// treated as long.
    pub fn pnl(&self) -> Option<ProfitAndLoss> {
        let (entry, exit) = (self.entry_price?, self.exit_price?);
        let direction = match self.side {
            Some(Side::Short) => Decimal::NEGATIVE_ONE,
            _ => Decimal::ONE,
        };
        let diff = (exit - entry) * direction;
        Some(ProfitAndLoss {
            pnl: self.quantity.map(|qty| diff * qty),
            pnl_percent: (!entry.is_zero()).then(|| diff / entry * Decimal::ONE_HUNDRED),
        })
    }
}
