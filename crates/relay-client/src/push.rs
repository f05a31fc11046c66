// In crates/relay-client/src/push.rs

use crate::sink::{DeliverySource, SignalSink};
use crate::{Error, Result};
use async_stream::stream;
use core_types::TradeSignal;
use futures::Stream;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Persistent push connection to the relay.
///
/// Every connection attempt advances round-robin through `endpoints`, and
/// any failure or disconnect waits a fixed `reconnect_delay` before the
/// next attempt.
#[derive(Debug, Clone)]
pub struct PushConnector {
    endpoints: Vec<String>,
    client_id: String,
    reconnect_delay: Duration,
}

impl PushConnector {
    pub fn new(
        endpoints: Vec<String>,
        client_id: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints("push"));
        }
        Ok(Self {
            endpoints,
            client_id: client_id.into(),
            reconnect_delay,
        })
    }

    /// The URL of the `attempt`-th connection, with `clientId` appended.
    pub fn endpoint_url(&self, attempt: usize) -> String {
        let base = &self.endpoints[attempt % self.endpoints.len()];
        let separator = if base.contains('?') { '&' } else { '?' };
        format!("{base}{separator}clientId={}", self.client_id)
    }

    /// Connects and returns a stream of received signals.
    ///
    /// The stream reconnects forever and only ends once `shutdown` is
    /// cancelled. Frames that are not valid signals are skipped.
    pub fn subscribe(self, shutdown: CancellationToken) -> impl Stream<Item = TradeSignal> {
        stream! {
            let mut attempt = 0usize;
            while !shutdown.is_cancelled() {
                let url = self.endpoint_url(attempt);
                attempt = attempt.wrapping_add(1);

                tracing::info!(url = %url, "Connecting to relay push channel...");
                let connected = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = connect_async(url.as_str()) => result,
                };

                match connected {
                    Ok((ws_stream, _)) => {
                        tracing::info!(url = %url, "Push channel connected.");
                        let mut read = ws_stream.fuse();

                        loop {
                            let message = tokio::select! {
                                _ = shutdown.cancelled() => None,
                                message = read.next() => message,
                            };
                            let Some(message) = message else { break };

                            match message {
                                Ok(Message::Text(text)) => match parse_signal(text.as_str()) {
                                    Ok(signal) => yield signal,
                                    Err(e) => tracing::debug!(error = %e, "Ignoring non-signal frame."),
                                },
                                Ok(Message::Close(_)) => {
                                    tracing::info!(url = %url, "Relay closed the push channel.");
                                    break;
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    tracing::warn!(error = %e, "Error reading from push channel. Reconnecting...");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let e = Error::WebSocket(Box::new(e));
                        tracing::warn!(url = %url, error = %e, "Push connection failed.");
                    }
                }

                if shutdown.is_cancelled() {
                    break;
                }
                tracing::info!(delay_ms = self.reconnect_delay.as_millis() as u64, "Reconnecting push channel after delay.");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.reconnect_delay) => {}
                }
            }
            tracing::info!("Push connector stopped.");
        }
    }

    /// Feeds every received signal to `sink`, one at a time, until
    /// `shutdown` is cancelled.
    pub async fn run(self, sink: Arc<dyn SignalSink>, shutdown: CancellationToken) {
        let signals = self.subscribe(shutdown);
        futures::pin_mut!(signals);
        while let Some(signal) = signals.next().await {
            sink.deliver(signal, DeliverySource::Push).await;
        }
    }
}

fn parse_signal(text: &str) -> Result<TradeSignal> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use core_types::Side;
    use events::LogNotifier;
    use rust_decimal_macros::dec;
    use web_server::AppState;

    #[test]
    fn test_endpoints_rotate_and_carry_client_id() {
        let connector = PushConnector::new(
            vec!["ws://a:1".to_string(), "ws://b:2/ws?x=1".to_string()],
            "2",
            Duration::from_millis(1200),
        )
        .unwrap();
        assert_eq!(connector.endpoint_url(0), "ws://a:1?clientId=2");
        assert_eq!(connector.endpoint_url(1), "ws://b:2/ws?x=1&clientId=2");
        assert_eq!(connector.endpoint_url(2), "ws://a:1?clientId=2");
    }

    #[test]
    fn test_requires_an_endpoint() {
        assert!(matches!(
            PushConnector::new(vec![], "2", Duration::from_millis(1)),
            Err(Error::NoEndpoints("push"))
        ));
    }

    #[tokio::test]
    async fn test_receives_pushed_signals_after_failed_endpoint() {
        let state = AppState::new(
            &app_config::RelaySettings::default(),
            0,
            Arc::new(LogNotifier),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let router = web_server::create_ws_router(state.clone());
        tokio::spawn(async move { axum::serve(listener, router).await });

        // The first endpoint refuses connections; rotation reaches the relay.
        let connector = PushConnector::new(
            vec!["ws://127.0.0.1:1".to_string(), format!("ws://{address}/")],
            "2",
            Duration::from_millis(50),
        )
        .unwrap();
        let sink = Arc::new(RecordingSink::default());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(connector.run(sink.clone(), shutdown.clone()));

        for _ in 0..200 {
            if state.registry.is_connected("2") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let signal = TradeSignal::new(Side::Short, None, dec!(1.5), 1, "2").unwrap();
        state
            .registry
            .deliver("2", serde_json::to_string(&signal).unwrap())
            .unwrap();
        state.registry.deliver("2", "{\"type\":\"hello\"}".to_string()).unwrap();

        let received = sink.wait_for(1, Duration::from_secs(5)).await;
        assert_eq!(received[0].0, signal);
        assert_eq!(received[0].1, DeliverySource::Push);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
