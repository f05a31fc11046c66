// In crates/engine/src/watcher.rs

use app_config::WatcherSettings;
use async_trait::async_trait;
use events::{Notification, NotificationKind, Notifier};
use execution::PaperOrderForm;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Reads a tab counter such as `"Pending (3)"`.
///
/// # Returns
///
/// * `Some(n)` for `"<label> (n)"`.
/// * `Some(0)` for the bare label.
/// * `None` when the text matches none of `labels`.
pub fn parse_counter(text: &str, labels: &[String]) -> Option<u32> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    for label in labels {
        let label = label.trim().to_lowercase();
        if label.is_empty() {
            continue;
        }
        if text == label {
            return Some(0);
        }
        let Some(rest) = text.strip_prefix(&label) else {
            continue;
        };
        let inner = rest
            .trim_start()
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'));
        if let Some(digits) = inner {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return digits.parse().ok();
            }
        }
    }
    None
}

/// A counter that only commits a new value once it has been seen
/// unchanged for the stable window.
#[derive(Debug, Clone)]
pub struct DebouncedCounter {
    committed: u32,
    candidate: Option<(u32, Instant)>,
    stable: Duration,
}

impl DebouncedCounter {
    pub fn new(initial: u32, stable: Duration) -> Self {
        Self {
            committed: initial,
            candidate: None,
            stable,
        }
    }

    pub fn value(&self) -> u32 {
        self.committed
    }

    /// Feeds one sample. Returns `(previous, new)` when a change commits.
    /// An unreadable sample (`None`) leaves everything as it was.
    pub fn observe(&mut self, raw: Option<u32>, now: Instant) -> Option<(u32, u32)> {
        let raw = raw?;
        if raw == self.committed {
            self.candidate = None;
            return None;
        }

        let since = match self.candidate {
            Some((value, since)) if value == raw => since,
            _ => {
                self.candidate = Some((raw, now));
                now
            }
        };
        if now.saturating_duration_since(since) < self.stable {
            return None;
        }

        let previous = self.committed;
        self.committed = raw;
        self.candidate = None;
        Some((previous, raw))
    }
}

/// Allows at most one event of each kind per window.
#[derive(Debug, Clone)]
pub struct EventThrottle {
    window: Duration,
    last: HashMap<NotificationKind, Instant>,
}

impl EventThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    pub fn allow(&mut self, kind: NotificationKind, now: Instant) -> bool {
        if let Some(at) = self.last.get(&kind) {
            if now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.last.insert(kind, now);
        true
    }
}

/// Periodic page refreshes while an order is pending.
#[derive(Debug, Clone)]
pub struct RefreshCycle {
    enabled: bool,
    every: Duration,
    max_per_cycle: u32,
    next_due: Option<Instant>,
    done: u32,
}

impl RefreshCycle {
    pub fn new(enabled: bool, every: Duration, max_per_cycle: u32) -> Self {
        Self {
            enabled,
            every,
            max_per_cycle,
            next_due: None,
            done: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// Starts a cycle unless one is already running.
    pub fn start(&mut self, now: Instant) {
        if !self.enabled || self.next_due.is_some() {
            return;
        }
        self.done = 0;
        self.next_due = Some(now + self.every);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
        self.done = 0;
    }

    /// Whether a refresh is due at `now`. A cycle that has used up its
    /// refreshes stops on its next due time instead.
    pub fn due(&mut self, now: Instant) -> bool {
        let Some(next) = self.next_due else {
            return false;
        };
        if now < next {
            return false;
        }
        if self.done >= self.max_per_cycle {
            tracing::info!(refreshes = self.done, "Refresh cycle exhausted.");
            self.stop();
            return false;
        }
        self.done += 1;
        self.next_due = Some(now + self.every);
        true
    }
}

/// Last committed counts of one watched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleState {
    pub pending: u32,
    pub positions: u32,
}

/// What one sample produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    pub events: Vec<NotificationKind>,
    pub refresh: bool,
}

/// Turns pending/positions samples into lifecycle events.
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    pending: DebouncedCounter,
    positions: DebouncedCounter,
    throttle: EventThrottle,
    refresh: RefreshCycle,
}

impl LifecycleMachine {
    /// Unreadable initial counts start at zero. A non-zero initial pending
    /// count starts a refresh cycle right away.
    pub fn new(
        settings: &WatcherSettings,
        pending: Option<u32>,
        positions: Option<u32>,
        now: Instant,
    ) -> Self {
        let mut refresh = RefreshCycle::new(
            settings.auto_refresh,
            settings.refresh_every(),
            settings.max_refreshes_per_cycle,
        );
        let pending = pending.unwrap_or(0);
        if pending > 0 {
            refresh.start(now);
        }
        Self {
            pending: DebouncedCounter::new(pending, settings.stable_window()),
            positions: DebouncedCounter::new(positions.unwrap_or(0), settings.stable_window()),
            throttle: EventThrottle::new(settings.dedupe_window()),
            refresh,
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState {
            pending: self.pending.value(),
            positions: self.positions.value(),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_active()
    }

    pub fn observe(&mut self, pending: Option<u32>, positions: Option<u32>, now: Instant) -> Step {
        let mut step = Step::default();

        if let Some((previous, current)) = self.pending.observe(pending, now) {
            if previous == 0 && current > 0 {
                self.emit(NotificationKind::OrderPending, now, &mut step);
                self.refresh.start(now);
            } else if previous > 0 && current == 0 {
                self.refresh.stop();
            }
        }

        if let Some((previous, current)) = self.positions.observe(positions, now) {
            if previous == 0 && current > 0 {
                self.emit(NotificationKind::OrderConfirmed, now, &mut step);
            } else if previous > 0 && current == 0 {
                self.emit(NotificationKind::TradeClosed, now, &mut step);
            }
        }

        step.refresh = self.refresh.due(now);
        step
    }

    fn emit(&mut self, kind: NotificationKind, now: Instant, step: &mut Step) {
        if self.throttle.allow(kind, now) {
            step.events.push(kind);
        } else {
            tracing::debug!(%kind, "Lifecycle event throttled.");
        }
    }
}

/// Where the watcher reads its counters from.
#[async_trait]
pub trait CounterSource: Send + Sync {
    /// Text of the pending-orders tab, if it can be found.
    async fn pending_label(&self) -> Option<String>;

    /// Text of the open-positions tab, if it can be found.
    async fn positions_label(&self) -> Option<String>;

    /// Reloads the view the counters are read from.
    async fn refresh(&self);
}

#[async_trait]
impl CounterSource for PaperOrderForm {
    async fn pending_label(&self) -> Option<String> {
        Some(PaperOrderForm::counter_label("Pending", self.pending()))
    }

    async fn positions_label(&self) -> Option<String> {
        Some(PaperOrderForm::counter_label("Positions", self.positions()))
    }

    async fn refresh(&self) {
        PaperOrderForm::refresh(self);
    }
}

/// Told about every lifecycle event the watcher commits.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    async fn on_event(&self, kind: NotificationKind);
}

/// Samples a [`CounterSource`] and reports lifecycle events.
pub struct LifecycleWatcher {
    source: Arc<dyn CounterSource>,
    notifier: Arc<dyn Notifier>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
    settings: WatcherSettings,
    symbol: Option<String>,
}

impl LifecycleWatcher {
    pub fn new(
        source: Arc<dyn CounterSource>,
        notifier: Arc<dyn Notifier>,
        settings: WatcherSettings,
        symbol: Option<String>,
    ) -> Self {
        Self {
            source,
            notifier,
            listeners: Vec::new(),
            settings,
            symbol,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    async fn read_counts(&self) -> (Option<u32>, Option<u32>) {
        let pending = self.source.pending_label().await;
        let positions = self.source.positions_label().await;
        (
            pending.and_then(|t| parse_counter(&t, &self.settings.pending_labels)),
            positions.and_then(|t| parse_counter(&t, &self.settings.positions_labels)),
        )
    }

    /// Watches until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let (pending, positions) = self.read_counts().await;
        let mut machine = LifecycleMachine::new(&self.settings, pending, positions, Instant::now());
        tracing::info!(state = ?machine.state(), refreshing = machine.is_refreshing(), "Lifecycle watcher started.");

        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (pending, positions) = self.read_counts().await;
            let step = machine.observe(pending, positions, Instant::now());

            for kind in step.events {
                self.publish(kind).await;
            }
            if step.refresh {
                tracing::debug!("Refreshing watched view.");
                self.source.refresh().await;
            }
        }
        tracing::info!("Lifecycle watcher stopped.");
    }

    async fn publish(&self, kind: NotificationKind) {
        let mut notification = Notification::new(kind, chrono::Utc::now().timestamp_millis());
        notification.symbol = self.symbol.clone();
        tracing::info!(%kind, "Lifecycle event.");
        for listener in &self.listeners {
            listener.on_event(kind).await;
        }
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!(%kind, error = %e, "Failed to send lifecycle notification.");
        }
    }
}
