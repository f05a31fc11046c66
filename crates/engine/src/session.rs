// In crates/engine/src/session.rs

use anyhow::Result;
use app_config::ConsumerSettings;
use async_trait::async_trait;
use core_types::TradeSignal;
use events::NotificationKind;
use execution::{ExecutionOrchestrator, Outcome};
use relay_client::{DeliverySource, PullPoller, PushConnector, SignalDeduplicator, SignalSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::watcher::LifecycleListener;

/// De-duplicates delivered signals and executes the ones that survive.
///
/// The lock is held for the whole execution, so signals arriving over push
/// and pull at the same time are handled one after the other.
pub struct SignalPipeline {
    dedupe: Mutex<SignalDeduplicator>,
    orchestrator: Arc<ExecutionOrchestrator>,
    handled: AtomicU64,
    ignored: AtomicU64,
}

impl SignalPipeline {
    pub fn new(orchestrator: Arc<ExecutionOrchestrator>, dedupe_window: Duration) -> Self {
        Self {
            dedupe: Mutex::new(SignalDeduplicator::new(dedupe_window)),
            orchestrator,
            handled: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Signals that passed de-duplication.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Signals dropped as duplicates.
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Forgets the last executed side so the next signal may repeat it.
    /// The minimum gap between executions still applies.
    pub async fn reset_side(&self) {
        self.dedupe.lock().await.reset_side();
        tracing::debug!("Last executed side cleared.");
    }
}

#[async_trait]
impl LifecycleListener for SignalPipeline {
    async fn on_event(&self, kind: NotificationKind) {
        if kind == NotificationKind::TradeClosed {
            self.reset_side().await;
        }
    }
}

#[async_trait]
impl SignalSink for SignalPipeline {
    async fn deliver(&self, signal: TradeSignal, source: DeliverySource) {
        let mut dedupe = self.dedupe.lock().await;
        if !dedupe.accept(signal.side(), Instant::now()) {
            self.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%source, side = %signal.side(), "Duplicate signal ignored.");
            return;
        }
        self.handled.fetch_add(1, Ordering::Relaxed);
        tracing::info!(%source, side = %signal.side(), atr = %signal.atr(), "Signal accepted.");

        match self.orchestrator.handle_signal(&signal).await {
            Ok(Outcome::Submitted(order)) => {
                tracing::info!(side = %order.side, qty = %order.quantity, "Signal executed.");
            }
            Ok(Outcome::Rejected(order)) => {
                tracing::warn!(side = %order.side, liq = ?order.liquidation_estimate, "Signal left unsubmitted.");
            }
            Err(e) => {
                tracing::warn!(error = %e, side = %signal.side(), "Failed to execute signal.");
            }
        }
    }
}

/// One consumer: its transports feeding one [`SignalPipeline`].
pub struct ConsumerSession {
    settings: ConsumerSettings,
    pipeline: Arc<SignalPipeline>,
}

impl ConsumerSession {
    pub fn new(settings: ConsumerSettings, orchestrator: Arc<ExecutionOrchestrator>) -> Self {
        let pipeline = Arc::new(SignalPipeline::new(orchestrator, settings.dedupe_window()));
        Self { settings, pipeline }
    }

    pub fn pipeline(&self) -> Arc<SignalPipeline> {
        self.pipeline.clone()
    }

    /// Runs the configured transports until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut task_handles = vec![];

        // --- 1. Push connection ---
        if self.settings.mode.uses_push() {
            let connector = PushConnector::new(
                self.settings.ws_endpoints.clone(),
                self.settings.client_id.clone(),
                self.settings.reconnect_delay(),
            )?;
            let sink: Arc<dyn SignalSink> = self.pipeline.clone();
            task_handles.push(tokio::spawn(connector.run(sink, shutdown.clone())));
        }

        // --- 2. Pull fallback ---
        if self.settings.mode.uses_pull() {
            let poller = PullPoller::from_settings(&self.settings)?;
            let sink: Arc<dyn SignalSink> = self.pipeline.clone();
            task_handles.push(tokio::spawn(poller.run(sink, shutdown.clone())));
        }

        tracing::info!(
            client_id = %self.settings.client_id,
            mode = ?self.settings.mode,
            transports = task_handles.len(),
            "Consumer session running."
        );

        for result in futures::future::join_all(task_handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "A transport task panicked.");
            }
        }
        tracing::info!(
            handled = self.pipeline.handled(),
            ignored = self.pipeline.ignored(),
            "Consumer session stopped."
        );
        Ok(())
    }
}
