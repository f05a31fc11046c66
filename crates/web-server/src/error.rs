// In crates/web-server/src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The request payload failed validation. Never retried.
    #[error("{0}")]
    Validation(String),

    #[error("No consumer connected for client {0}")]
    NoConsumer(String),

    #[error("Consumer connection for client {0} is closed")]
    ConnectionClosed(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Notification failed: {0}")]
    Notify(#[from] events::Error),

    #[error("Failed to bind server address: {0}")]
    ServerBindError(std::io::Error),

    #[error("Server terminated with an error: {0}")]
    ServeError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::Notify(events::Error::Invalid(_)) => {
                StatusCode::BAD_REQUEST
            }
            Error::Notify(events::Error::Delivery(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed.");
        }
        let body = Json(serde_json::json!({ "ok": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}
