// In crates/execution/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No entry price: the signal, the price field and the market price are all empty")]
    MissingEntryPrice,

    #[error("Account balance is not available")]
    BalanceUnavailable,

    #[error("Order form failed: {reason}")]
    FormFailed { reason: String },

    #[error("Order computation failed: {0}")]
    Computation(#[from] risk::Error),

    #[error("Signal store error: {0}")]
    Store(#[from] signal_store::Error),

    #[error("Signal store write did not complete: {0}")]
    StoreTask(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
