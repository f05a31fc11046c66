// In crates/web-server/src/types.rs

use core_types::TradeSignal;
use serde::{Deserialize, Serialize};

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Response of `GET /pull`. `msg` is `null` when the queue was empty.
#[derive(Debug, Serialize, Deserialize)]
pub struct PullResponse {
    pub ok: bool,
    pub msg: Option<TradeSignal>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    /// Ingress URL producers should post to.
    pub http: String,
}

/// The `?clientId=` query parameter shared by several routes.
#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,
}

impl ClientQuery {
    /// The trimmed client id, if a non-empty one was given.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
