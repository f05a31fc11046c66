// In crates/execution/src/paper.rs

use crate::types::FormSnapshot;
use crate::{Error, OrderForm, Result};
use async_trait::async_trait;
use core_types::Side;
use risk::rounding::decimals_of;
use risk::{ComputedOrder, FieldPrecision};
use rust_decimal::Decimal;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct PaperState {
    side: Option<Side>,
    fields: FormSnapshot,
    market_price: Option<Decimal>,
    pending: u32,
    positions: u32,
    submitted: u32,
    refreshes: u32,
}

/// An in-memory order form for local runs and tests.
///
/// Submitting places a pending order. Pending orders turn into positions
/// through [`PaperOrderForm::fill_pending`] or, when `fill_on_refresh` is
/// set, on the next [`PaperOrderForm::refresh`].
#[derive(Debug)]
pub struct PaperOrderForm {
    balance: Option<Decimal>,
    symbol: Option<String>,
    precision: Option<FieldPrecision>,
    fill_on_refresh: bool,
    state: Mutex<PaperState>,
}

impl PaperOrderForm {
    pub fn new(balance: Decimal, market_price: Option<Decimal>) -> Self {
        Self::build(Some(balance), market_price)
    }

    /// A form whose balance cannot be read.
    pub fn without_balance(market_price: Option<Decimal>) -> Self {
        Self::build(None, market_price)
    }

    fn build(balance: Option<Decimal>, market_price: Option<Decimal>) -> Self {
        Self {
            balance,
            symbol: None,
            precision: None,
            fill_on_refresh: false,
            state: Mutex::new(PaperState {
                market_price,
                ..PaperState::default()
            }),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Fixes the field precision instead of reading it from the field values.
    pub fn with_precision(mut self, precision: FieldPrecision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_fill_on_refresh(mut self, fill: bool) -> Self {
        self.fill_on_refresh = fill;
        self
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_market_price(&self, price: Option<Decimal>) {
        self.state().market_price = price;
    }

    pub fn selected_side(&self) -> Option<Side> {
        self.state().side
    }

    pub fn submitted(&self) -> u32 {
        self.state().submitted
    }

    pub fn pending(&self) -> u32 {
        self.state().pending
    }

    pub fn positions(&self) -> u32 {
        self.state().positions
    }

    pub fn refreshes(&self) -> u32 {
        self.state().refreshes
    }

    /// Moves every pending order into an open position. Returns how many.
    pub fn fill_pending(&self) -> u32 {
        let mut state = self.state();
        let filled = state.pending;
        state.positions += filled;
        state.pending = 0;
        filled
    }

    /// Drops every pending order. Returns how many.
    pub fn cancel_pending(&self) -> u32 {
        std::mem::take(&mut self.state().pending)
    }

    /// Closes every open position. Returns how many.
    pub fn close_positions(&self) -> u32 {
        std::mem::take(&mut self.state().positions)
    }

    /// Reloads the simulated page.
    pub fn refresh(&self) {
        let mut state = self.state();
        state.refreshes += 1;
        if self.fill_on_refresh && state.pending > 0 {
            state.positions += state.pending;
            state.pending = 0;
        }
    }

    /// Tab text for `label`, the way venues render it: `"Pending (2)"`, or
    /// the bare label when the count is zero.
    pub fn counter_label(label: &str, count: u32) -> String {
        if count == 0 {
            label.to_string()
        } else {
            format!("{label} ({count})")
        }
    }
}

#[async_trait]
impl OrderForm for PaperOrderForm {
    fn name(&self) -> &'static str {
        "PaperOrderForm"
    }

    fn symbol(&self) -> Option<String> {
        self.symbol.clone()
    }

    async fn select_side(&self, side: Side) -> Result<()> {
        self.state().side = Some(side);
        Ok(())
    }

    async fn entry_price(&self) -> Option<Decimal> {
        self.state().fields.entry
    }

    async fn market_price(&self) -> Option<Decimal> {
        self.state().market_price
    }

    async fn balance(&self) -> Option<Decimal> {
        self.balance
    }

    async fn field_precision(&self) -> FieldPrecision {
        if let Some(precision) = self.precision {
            return precision;
        }
        let state = self.state();
        let fields = &state.fields;
        FieldPrecision {
            price: fields.entry.map(decimals_of),
            take_profit: fields.take_profit.map(decimals_of),
            stop_loss: fields.stop_loss.map(decimals_of),
            quantity: fields.quantity.map(decimals_of),
        }
    }

    async fn apply(&self, order: &ComputedOrder) -> Result<()> {
        let mut state = self.state();
        if state.side != Some(order.side) {
            return Err(Error::FormFailed {
                reason: format!("form is on {:?}, order is {}", state.side, order.side),
            });
        }
        state.fields = FormSnapshot {
            entry: Some(order.entry),
            take_profit: Some(order.take_profit),
            stop_loss: Some(order.stop_loss),
            quantity: Some(order.quantity),
        };
        Ok(())
    }

    async fn submit(&self) -> Result<()> {
        let mut state = self.state();
        if state.side.is_none() || state.fields.quantity.is_none() {
            return Err(Error::FormFailed {
                reason: "nothing to submit".to_string(),
            });
        }
        state.submitted += 1;
        state.pending += 1;
        tracing::debug!(pending = state.pending, "Paper order placed.");
        Ok(())
    }

    async fn snapshot(&self) -> FormSnapshot {
        self.state().fields.clone()
    }
}
