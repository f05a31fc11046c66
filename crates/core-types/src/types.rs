// In crates/core-types/src/types.rs

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client id used when a producer or consumer does not name one.
pub const DEFAULT_CLIENT_ID: &str = "1";

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// +1 for longs, -1 for shorts.
    pub fn direction(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            other => Err(Error::InvalidSide(other.to_string())),
        }
    }
}

/// A directional signal emitted by the charting front-end.
///
/// Signals are immutable once built: every field is private and the only
/// constructors validate the ATR. On the wire a signal is tagged with
/// `"type": "tv_signal"` so consumers can tell it apart from other frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "tv_signal")]
pub struct TradeSignal {
    side: Side,
    #[serde(with = "rust_decimal::serde::float_option")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    atr: Decimal,
    #[serde(rename = "ts")]
    timestamp: i64,
    #[serde(rename = "clientId")]
    client_id: String,
}

impl TradeSignal {
    /// Builds a signal, rejecting non-positive ATR values.
    pub fn new(
        side: Side,
        price: Option<Decimal>,
        atr: Decimal,
        timestamp: i64,
        client_id: impl Into<String>,
    ) -> Result<Self> {
        if atr <= Decimal::ZERO {
            return Err(Error::InvalidAtr);
        }
        let client_id = client_id.into();
        let client_id = if client_id.trim().is_empty() {
            DEFAULT_CLIENT_ID.to_string()
        } else {
            client_id
        };
        Ok(Self {
            side,
            price,
            atr,
            timestamp,
            client_id,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// The price quoted by the producer, if it sent one.
    pub fn price(&self) -> Option<Decimal> {
        self.price.filter(|p| *p > Decimal::ZERO)
    }

    pub fn atr(&self) -> Decimal {
        self.atr
    }

    /// Producer timestamp in epoch milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Frame tag carried by every serialized signal.
pub const SIGNAL_FRAME_TYPE: &str = "tv_signal";

// The wire shape, validated through `TradeSignal::new` on the way in.
#[derive(Deserialize)]
struct WireSignal {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    side: Side,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    atr: Decimal,
    #[serde(rename = "ts", default)]
    timestamp: i64,
    #[serde(rename = "clientId", default)]
    client_id: String,
}

impl<'de> Deserialize<'de> for TradeSignal {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = WireSignal::deserialize(deserializer)?;
        if let Some(kind) = wire.kind.as_deref() {
            if kind != SIGNAL_FRAME_TYPE {
                return Err(serde::de::Error::custom(format!(
                    "unexpected frame type `{kind}`"
                )));
            }
        }
        TradeSignal::new(wire.side, wire.price, wire.atr, wire.timestamp, wire.client_id)
            .map_err(serde::de::Error::custom)
    }
}
