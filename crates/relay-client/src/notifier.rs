// In crates/relay-client/src/notifier.rs

use async_trait::async_trait;
use events::{Notification, Notifier};
use std::time::Duration;

/// Posts notifications as JSON to the relay's `/notify` endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::Error::ClientBuildError(e.to_string()))?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> events::Result<()> {
        notification.validate()?;
        let response = self
            .http_client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| events::Error::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(events::Error::Delivery(format!("status {status}: {body}")));
        }
        tracing::debug!(kind = %notification.kind, url = %self.url, "Notification posted.");
        Ok(())
    }
}
