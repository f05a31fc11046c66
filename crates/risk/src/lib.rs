// In crates/risk/src/lib.rs

pub mod engine;
pub mod error;
pub mod rounding;
pub mod types;

// Re-export public types
pub use engine::{compute_order_parameters, liquidation_price};
pub use error::{Error, Result};
pub use types::{ComputedOrder, FieldPrecision, RiskSettings, Verdict};
