// In crates/events/src/lib.rs

pub mod error;
pub mod notification;
pub mod notifier;

pub use error::{Error, Result};
pub use notification::{Notification, NotificationKind, ProfitAndLoss};
pub use notifier::{LogNotifier, Notifier};
