// In crates/engine/src/lib.rs

pub mod session;
pub mod watcher;

pub use session::{ConsumerSession, SignalPipeline};
pub use watcher::{
    CounterSource, DebouncedCounter, EventThrottle, LifecycleListener, LifecycleMachine,
    LifecycleState, LifecycleWatcher, RefreshCycle, Step, parse_counter,
};

use anyhow::{Context, Result};
use app_config::Settings;
use events::{LogNotifier, Notifier};
use execution::{ExecutionOrchestrator, PaperOrderForm};
use relay_client::HttpNotifier;
use signal_store::SignalStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The consumer-side orchestrator: one session on a paper form, plus an
/// optional lifecycle watcher on the same form.
pub struct Engine {
    settings: Settings,
    watch: bool,
}

impl Engine {
    pub fn new(settings: Settings, watch: bool) -> Self {
        Self { settings, watch }
    }

    /// Picks the HTTP notifier when a notify URL is configured.
    pub fn notifier(settings: &Settings) -> Result<Arc<dyn Notifier>> {
        match &settings.consumer.notify_url {
            Some(url) => {
                let notifier = HttpNotifier::new(url.clone(), settings.consumer.request_timeout())
                    .context("Failed to build the HTTP notifier")?;
                Ok(Arc::new(notifier))
            }
            None => Ok(Arc::new(LogNotifier)),
        }
    }

    /// Runs until `shutdown` is cancelled or a task fails to start.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(client_id = %self.settings.consumer.client_id, "Initializing consumer engine...");
        let consumer = &self.settings.consumer;

        // --- 1. Shared components ---
        let store = SignalStore::open(&consumer.store_path)
            .with_context(|| format!("Failed to open signal store at {}", consumer.store_path))?;
        let notifier = Self::notifier(&self.settings)?;

        let mut form = PaperOrderForm::new(consumer.paper_balance, Some(consumer.paper_price))
            .with_fill_on_refresh(true);
        if let Some(symbol) = &consumer.symbol {
            form = form.with_symbol(symbol.clone());
        }
        let form = Arc::new(form);

        // --- 2. Execution ---
        let orchestrator = Arc::new(ExecutionOrchestrator::new(
            form.clone(),
            store,
            notifier.clone(),
            self.settings.risk.clone(),
            consumer.submit_delay(),
        ));
        let session = ConsumerSession::new(consumer.clone(), orchestrator);
        let pipeline = session.pipeline();

        let mut task_handles = vec![tokio::spawn(session.run(shutdown.clone()))];

        // --- 3. Lifecycle watcher ---
        if self.watch {
            let watcher = LifecycleWatcher::new(
                form,
                notifier,
                self.settings.watcher.clone(),
                consumer.symbol.clone(),
            )
            // A closed trade lets the next signal reuse the last side.
            .with_listener(pipeline);
            let token = shutdown.clone();
            task_handles.push(tokio::spawn(async move {
                watcher.run(token).await;
                Ok::<(), anyhow::Error>(())
            }));
        }

        tracing::info!(count = task_handles.len(), "All consumer tasks have been spawned.");

        for result in futures::future::join_all(task_handles).await {
            result.context("Consumer task panicked")??;
        }
        tracing::info!("Consumer engine stopped.");
        Ok(())
    }
}
