// In crates/events/src/notifier.rs

use crate::notification::{Notification, NotificationKind};
use crate::Result;
use async_trait::async_trait;

/// A sink for trade and order lifecycle records.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes every notification to the structured log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        n.validate()?;
        let at = n.timestamp().map(|t| t.to_rfc3339());

        match n.kind {
            NotificationKind::OpenOperation => tracing::info!(
                kind = %n.kind,
                side = ?n.side,
                symbol = ?n.symbol,
                entry = ?n.entry_price,
                tp = ?n.take_profit,
                sl = ?n.stop_loss,
                rr = ?n.risk_reward(),
                atr = ?n.atr,
                leverage = ?n.leverage,
                qty = ?n.quantity,
                note = ?n.note,
                client_id = ?n.client_id,
                ?at,
                "Operation opened."
            ),
            NotificationKind::TradeClosed => {
                let result = n.pnl();
                tracing::info!(
                    kind = %n.kind,
                    side = ?n.side,
                    symbol = ?n.symbol,
                    entry = ?n.entry_price,
                    exit = ?n.exit_price,
                    pnl = ?result.and_then(|r| r.pnl),
                    pnl_pct = ?result.and_then(|r| r.pnl_percent),
                    qty = ?n.quantity,
                    note = ?n.note,
                    ?at,
                    "Trade closed."
                )
            }
            NotificationKind::OrderPending
            | NotificationKind::OrderCanceled
            | NotificationKind::OrderConfirmed => {
                tracing::info!(kind = %n.kind, symbol = ?n.symbol, ?at, "Order lifecycle event.")
            }
        }
        Ok(())
    }
}
