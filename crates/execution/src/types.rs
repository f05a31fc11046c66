// In crates/execution/src/types.rs

use risk::ComputedOrder;
use rust_decimal::Decimal;
use serde::Serialize;

/// Values currently shown in the order form fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSnapshot {
    pub entry: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub quantity: Option<Decimal>,
}

/// What happened to a delivered signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The form was filled and submitted.
    Submitted(ComputedOrder),
    /// The form was filled for display, but the order was too close to
    /// liquidation and nothing was submitted.
    Rejected(ComputedOrder),
}

impl Outcome {
    pub fn order(&self) -> &ComputedOrder {
        match self {
            Outcome::Submitted(order) | Outcome::Rejected(order) => order,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Outcome::Submitted(_))
    }
}
