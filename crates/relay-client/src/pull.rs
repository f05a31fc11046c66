// In crates/relay-client/src/pull.rs

use crate::sink::{DeliverySource, SignalSink};
use crate::{Error, Result};
use app_config::ConsumerSettings;
use core_types::TradeSignal;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Between polls, no timer armed.
    Idle,
    /// Waiting for the armed timer.
    Scheduled(Duration),
    /// One request in flight.
    Polling,
}

/// Adaptive poll timing.
///
/// The base delay starts at `min`, resets to `min` after every successful
/// poll and grows by `factor` (floored to whole milliseconds, capped at
/// `max`) after every failure. Each scheduled wait adds a uniform jitter in
/// `[0, jitter)`.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: Duration,
    delay: Duration,
    state: PollState,
}

impl PollSchedule {
    pub fn new(min: Duration, max: Duration, factor: f64, jitter: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            factor,
            jitter,
            delay: min,
            state: PollState::Idle,
        }
    }

    pub fn from_settings(settings: &ConsumerSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.poll_min_ms),
            Duration::from_millis(settings.poll_max_ms),
            settings.poll_backoff_factor,
            Duration::from_millis(settings.poll_jitter_ms),
        )
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// The base delay, without jitter.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// `Idle -> Scheduled`. Returns the wait before the next poll.
    pub fn schedule(&mut self) -> Duration {
        let wait = self.delay + self.sample_jitter();
        self.state = PollState::Scheduled(wait);
        wait
    }

    /// `Scheduled -> Polling`.
    pub fn begin_poll(&mut self) {
        self.state = PollState::Polling;
    }

    /// `Polling -> Idle`, resetting the delay.
    pub fn on_success(&mut self) {
        self.delay = self.min;
        self.state = PollState::Idle;
    }

    /// `Polling -> Idle`, backing off.
    pub fn on_failure(&mut self) {
        let grown = (self.delay.as_millis() as f64 * self.factor).floor() as u64;
        self.delay = Duration::from_millis(grown).min(self.max);
        self.state = PollState::Idle;
    }

    fn sample_jitter(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

// Body of `GET /pull`.
#[derive(Debug, Deserialize)]
struct PullBody {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    msg: Option<serde_json::Value>,
}

/// Short-interval poller for consumers without a push connection.
#[derive(Debug, Clone)]
pub struct PullPoller {
    http_client: reqwest::Client,
    endpoints: Vec<String>,
    client_id: String,
    schedule: PollSchedule,
}

impl PullPoller {
    pub fn new(
        endpoints: Vec<String>,
        client_id: impl Into<String>,
        schedule: PollSchedule,
        request_timeout: Duration,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints("pull"));
        }
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoints,
            client_id: client_id.into(),
            schedule,
        })
    }

    pub fn from_settings(settings: &ConsumerSettings) -> Result<Self> {
        Self::new(
            settings.pull_endpoints.clone(),
            settings.client_id.clone(),
            PollSchedule::from_settings(settings),
            settings.request_timeout(),
        )
    }

    /// Fetches at most one queued message from the endpoint for `attempt`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(signal))` when a valid signal was dequeued.
    /// * `Ok(None)` when the queue was empty or held something that is not a
    ///   valid signal (it is consumed either way).
    /// * `Err(..)` on transport or protocol failure.
    pub async fn poll_once(&self, attempt: usize) -> Result<Option<TradeSignal>> {
        let url = &self.endpoints[attempt % self.endpoints.len()];
        let now = chrono::Utc::now().timestamp_millis().to_string();

        let response = self
            .http_client
            .get(url)
            .query(&[("clientId", self.client_id.as_str()), ("t", now.as_str())])
            .send()
            .await
            .map_err(Error::RequestFailed)?;

        let status = response.status();
        let text = response.text().await.map_err(Error::RequestFailed)?;
        if !status.is_success() {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: PullBody = serde_json::from_str(&text).map_err(Error::DeserializationFailed)?;
        if !body.ok {
            return Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        match body.msg.filter(|m| !m.is_null()) {
            Some(msg) => match serde_json::from_value::<TradeSignal>(msg) {
                Ok(signal) => Ok(Some(signal)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed message from pull queue.");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Polls until `shutdown` is cancelled.
    ///
    /// Only one request is ever in flight, and a received signal is handed
    /// to `sink` before the next poll is scheduled.
    pub async fn run(mut self, sink: Arc<dyn SignalSink>, shutdown: CancellationToken) {
        let mut attempt = 0usize;
        tracing::info!(client_id = %self.client_id, endpoints = ?self.endpoints, "Pull poller started.");

        loop {
            let wait = self.schedule.schedule();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            self.schedule.begin_poll();
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.poll_once(attempt) => outcome,
            };
            attempt = attempt.wrapping_add(1);

            match outcome {
                Ok(Some(signal)) => {
                    self.schedule.on_success();
                    tracing::info!(side = %signal.side(), atr = %signal.atr(), "Signal pulled.");
                    sink.deliver(signal, DeliverySource::Pull).await;
                }
                Ok(None) => self.schedule.on_success(),
                Err(e) => {
                    self.schedule.on_failure();
                    tracing::debug!(error = %e, next_delay_ms = self.schedule.delay().as_millis() as u64, "Poll failed. Backing off.");
                }
            }
        }
        tracing::info!("Pull poller stopped.");
    }
}
