// In crates/relay-client/src/sink.rs

use async_trait::async_trait;
use core_types::TradeSignal;
use std::fmt;

/// Which transport delivered a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverySource {
    Push,
    Pull,
}

impl fmt::Display for DeliverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliverySource::Push => f.write_str("push"),
            DeliverySource::Pull => f.write_str("pull"),
        }
    }
}

/// Receives every signal a transport delivers.
///
/// Transports await `deliver` before reading the next message, so a slow
/// sink applies back-pressure instead of buffering.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: TradeSignal, source: DeliverySource);
}
