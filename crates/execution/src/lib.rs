// In crates/execution/src/lib.rs

use async_trait::async_trait;
use core_types::Side;
use risk::{ComputedOrder, FieldPrecision};
use rust_decimal::Decimal;

pub mod error;
pub mod orchestrator;
pub mod paper;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use orchestrator::ExecutionOrchestrator;
pub use paper::PaperOrderForm;
pub use types::{FormSnapshot, Outcome};

/// The universal interface for an order-entry form.
///
/// An `OrderForm` is whatever the orchestrator fills in and submits: a
/// venue's order ticket, or an in-memory paper form. Implementations own
/// all venue-specific details of reading and writing fields.
#[async_trait]
pub trait OrderForm: Send + Sync {
    /// The name of the form (e.g., "PaperOrderForm").
    fn name(&self) -> &'static str;

    /// The traded symbol, if the form knows it.
    fn symbol(&self) -> Option<String>;

    /// Switches the form to the long or short tab.
    async fn select_side(&self, side: Side) -> Result<()>;

    /// The value currently typed in the price field.
    async fn entry_price(&self) -> Option<Decimal>;

    /// The last traded price shown by the venue.
    async fn market_price(&self) -> Option<Decimal>;

    /// The account balance in quote currency.
    async fn balance(&self) -> Option<Decimal>;

    /// Decimal places of the price, TP, SL and quantity fields.
    async fn field_precision(&self) -> FieldPrecision;

    /// Writes entry, TP, SL and quantity into their fields.
    ///
    /// # Arguments
    ///
    /// * `order`: The computed order. Its `take_profit` and `stop_loss`
    ///   already hold the values destined for each field after any swap.
    async fn apply(&self, order: &ComputedOrder) -> Result<()>;

    /// Presses the submit button for the selected side.
    async fn submit(&self) -> Result<()>;

    /// Reads back the field values.
    async fn snapshot(&self) -> FormSnapshot;
}
