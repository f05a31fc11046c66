// In crates/relay-client/src/lib.rs

//! Consumer-side transports for the relay: a persistent push connection,
//! an adaptive pull poller, duplicate suppression and an HTTP notifier.

pub mod dedupe;
pub mod error;
pub mod notifier;
pub mod pull;
pub mod push;
pub mod sink;

// Re-export public types
pub use dedupe::SignalDeduplicator;
pub use error::{Error, Result};
pub use notifier::HttpNotifier;
pub use pull::{PollSchedule, PollState, PullPoller};
pub use push::PushConnector;
pub use sink::{DeliverySource, SignalSink};
