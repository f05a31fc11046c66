// In crates/events/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid notification: {0}")]
    Invalid(String),

    #[error("Notification could not be delivered: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, Error>;
