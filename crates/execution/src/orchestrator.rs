// In crates/execution/src/orchestrator.rs

use crate::types::Outcome;
use crate::{Error, OrderForm, Result};
use core_types::TradeSignal;
use events::{Notification, NotificationKind, Notifier};
use risk::{RiskSettings, Verdict, compute_order_parameters};
use signal_store::SignalStore;
use std::sync::Arc;
use std::time::Duration;

/// Turns a delivered signal into a filled, and usually submitted, order.
pub struct ExecutionOrchestrator {
    form: Arc<dyn OrderForm>,
    store: SignalStore,
    notifier: Arc<dyn Notifier>,
    risk_defaults: RiskSettings,
    submit_delay: Duration,
    venue: String,
}

impl ExecutionOrchestrator {
    pub fn new(
        form: Arc<dyn OrderForm>,
        store: SignalStore,
        notifier: Arc<dyn Notifier>,
        risk_defaults: RiskSettings,
        submit_delay: Duration,
    ) -> Self {
        let venue = form.name().to_string();
        Self {
            form,
            store,
            notifier,
            risk_defaults,
            submit_delay,
            venue,
        }
    }

    /// Handles one accepted signal end to end.
    ///
    /// # Returns
    ///
    /// * `Ok(Outcome::Submitted)` after the form was filled and submitted.
    /// * `Ok(Outcome::Rejected)` when the liquidation check blocked it.
    /// * `Err(..)` when no order could be computed or the form failed.
    pub async fn handle_signal(&self, signal: &TradeSignal) -> Result<Outcome> {
        let side = signal.side();

        // --- 1. Remember the signal and its ATR ---
        self.remember(signal).await?;

        // --- 2. Resolve entry and balance ---
        self.form.select_side(side).await?;
        let entry = match signal.price() {
            Some(price) => price,
            None => match self.form.entry_price().await {
                Some(price) => price,
                None => self
                    .form
                    .market_price()
                    .await
                    .ok_or(Error::MissingEntryPrice)?,
            },
        };
        let balance = self.form.balance().await.ok_or(Error::BalanceUnavailable)?;

        // --- 3. Compute against the current settings ---
        let settings = self.store.risk_settings(&self.risk_defaults)?;
        let precision = self.form.field_precision().await;
        let order = compute_order_parameters(signal, &settings, entry, balance, &precision)?;

        // --- 4. Fill the form, even when the order will not be submitted ---
        self.form.apply(&order).await?;
        tracing::info!(
            %side,
            entry = %order.entry,
            tp = %order.take_profit,
            sl = %order.stop_loss,
            qty = %order.quantity,
            rr = %order.risk_reward_ratio.round_dp(2),
            verdict = ?order.verdict,
            notes = ?order.notes,
            "Order form filled."
        );

        if order.verdict == Verdict::Rejected {
            tracing::warn!(%side, "Order blocked: stop-loss too close to liquidation.");
            return Ok(Outcome::Rejected(order));
        }

        // --- 5. Submit after the form settles ---
        tokio::time::sleep(self.submit_delay).await;
        self.form.submit().await?;
        tracing::info!(%side, form = self.form.name(), "Order submitted.");

        // --- 6. Notify ---
        self.notify_open(signal, &settings).await;

        Ok(Outcome::Submitted(order))
    }

    // Store writes hit the disk, so they run on the blocking pool.
    async fn remember(&self, signal: &TradeSignal) -> Result<()> {
        let store = self.store.clone();
        let signal = signal.clone();
        tokio::task::spawn_blocking(move || -> signal_store::Result<()> {
            store.set_atr(signal.atr())?;
            store.set_last_signal(&signal)
        })
        .await??;
        Ok(())
    }

    // Builds the record from what the form actually shows.
    async fn notify_open(&self, signal: &TradeSignal, settings: &RiskSettings) {
        let snapshot = self.form.snapshot().await;
        let (Some(entry), Some(tp), Some(sl)) =
            (snapshot.entry, snapshot.take_profit, snapshot.stop_loss)
        else {
            tracing::warn!(?snapshot, "Form has no valid entry/TP/SL. Skipping open notification.");
            return;
        };

        let mut notification = Notification::new(
            NotificationKind::OpenOperation,
            chrono::Utc::now().timestamp_millis(),
        );
        notification.side = Some(signal.side());
        notification.symbol = self.form.symbol();
        notification.entry_price = Some(entry);
        notification.take_profit = Some(tp);
        notification.stop_loss = Some(sl);
        notification.quantity = snapshot.quantity;
        notification.leverage = Some(settings.leverage);
        notification.atr = Some(signal.atr());
        notification.note = Some(format!("auto from {}", self.venue));
        notification.client_id = Some(signal.client_id().to_string());

        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(error = %e, "Failed to send open notification.");
        }
    }
}
