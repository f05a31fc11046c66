// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Field 'side' must be 'long' or 'short', got '{0}'")]
    InvalidSide(String),

    #[error("ATR must be a positive, finite number")]
    InvalidAtr,
}

pub type Result<T> = std::result::Result<T, Error>;
