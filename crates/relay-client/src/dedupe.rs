// In crates/relay-client/src/dedupe.rs

use core_types::Side;
use std::time::Duration;
use tokio::time::Instant;

/// Collapses the duplicates produced when push and pull deliver the same
/// signal, and filters rapid flip-flops.
///
/// A signal is accepted only if its side differs from the last accepted side
/// AND at least `window` has passed since that signal.
#[derive(Debug, Clone)]
pub struct SignalDeduplicator {
    window: Duration,
    last_side: Option<Side>,
    last_at: Option<Instant>,
}

impl SignalDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_side: None,
            last_at: None,
        }
    }

    /// Decides on a signal observed at `now`, recording it when accepted.
    pub fn accept(&mut self, side: Side, now: Instant) -> bool {
        let new_side = self.last_side != Some(side);
        let spaced = self
            .last_at
            .is_none_or(|at| now.saturating_duration_since(at) >= self.window);
        let accepted = new_side && spaced;
        if accepted {
            self.last_side = Some(side);
            self.last_at = Some(now);
        }
        accepted
    }

    /// Forgets the last side once the position is flat, so the same side
    /// may trade again. The window still counts from the last signal.
    pub fn reset_side(&mut self) {
        self.last_side = None;
    }

    pub fn last_side(&self) -> Option<Side> {
        self.last_side
    }
}
