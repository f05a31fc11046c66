// In crates/risk/src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),

    #[error("Entry price must be positive, got {0}")]
    InvalidEntry(Decimal),

    #[error("Stop distance is not positive (entry {entry}, stop {stop_loss})")]
    NonPositiveStopDistance { entry: Decimal, stop_loss: Decimal },

    #[error("TP/SL crossed for {side} at entry {entry}: tp={take_profit} sl={stop_loss}")]
    CrossedTargets {
        side: core_types::Side,
        entry: Decimal,
        take_profit: Decimal,
        stop_loss: Decimal,
    },

    #[error("Arithmetic overflow while computing the {0}")]
    Overflow(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
