// In crates/relay-client/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the HTTP client: {0}")]
    ClientBuildError(String),
    #[error("No {0} endpoints configured")]
    NoEndpoints(&'static str),
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("Relay answered with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, Error>;
