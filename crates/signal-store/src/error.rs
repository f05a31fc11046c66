// In crates/signal-store/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read or write the store file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize store value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock was poisoned")]
    Poisoned,

    #[error("Rejected settings update: {0}")]
    InvalidSettings(#[from] risk::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
