// In crates/app-config/src/types.rs

use crate::{Error, Result};
use core_types::DEFAULT_CLIENT_ID;
use risk::RiskSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Relay HTTP/WebSocket listeners.
    pub server: ServerSettings,
    /// Relay-side queueing.
    pub relay: RelaySettings,
    /// Execution-side consumer session.
    pub consumer: ConsumerSettings,
    /// Defaults for any risk key missing from the signal store.
    pub risk: RiskSettings,
    pub watcher: WatcherSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.risk
            .validate()
            .map_err(|e| Error::Invalid(e.to_string()))?;
        if self.relay.queue_capacity == 0 {
            return Err(Error::Invalid("relay.queue_capacity must be > 0".into()));
        }
        let consumer = &self.consumer;
        if consumer.poll_min_ms == 0 || consumer.poll_min_ms > consumer.poll_max_ms {
            return Err(Error::Invalid(format!(
                "consumer poll window {}..{} ms is empty",
                consumer.poll_min_ms, consumer.poll_max_ms
            )));
        }
        if consumer.poll_backoff_factor < 1.0 {
            return Err(Error::Invalid(
                "consumer.poll_backoff_factor must be >= 1".into(),
            ));
        }
        if consumer.mode.uses_push() && consumer.ws_endpoints.is_empty() {
            return Err(Error::Invalid("push mode needs at least one ws endpoint".into()));
        }
        if consumer.mode.uses_pull() && consumer.pull_endpoints.is_empty() {
            return Err(Error::Invalid("pull mode needs at least one pull endpoint".into()));
        }
        if self.watcher.poll_ms == 0 {
            return Err(Error::Invalid("watcher.poll_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application. `RUST_LOG` takes precedence.
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// Serves `/tv`, `/pull`, `/notify`, `/health` and `/ws`.
    pub port: u16,
    /// Dedicated WebSocket listener serving the upgrade at `/`.
    pub ws_port: Option<u16>,
    pub body_limit_kb: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            ws_port: Some(8788),
            body_limit_kb: 256,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RelaySettings {
    /// Per-client queue bound; the oldest message is dropped beyond it.
    pub queue_capacity: usize,
    pub default_client_id: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            queue_capacity: 200,
            default_client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Which transports a consumer session runs.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerMode {
    Push,
    #[default]
    Pull,
    Both,
}

impl ConsumerMode {
    pub fn uses_push(&self) -> bool {
        matches!(self, ConsumerMode::Push | ConsumerMode::Both)
    }

    pub fn uses_pull(&self) -> bool {
        matches!(self, ConsumerMode::Pull | ConsumerMode::Both)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ConsumerSettings {
    pub client_id: String,
    pub mode: ConsumerMode,
    /// Tried round-robin; `clientId` is appended as a query parameter.
    pub ws_endpoints: Vec<String>,
    pub pull_endpoints: Vec<String>,
    /// Where lifecycle and open-operation records are posted. Unset logs them.
    pub notify_url: Option<String>,
    pub reconnect_delay_ms: u64,
    pub poll_min_ms: u64,
    pub poll_max_ms: u64,
    pub poll_backoff_factor: f64,
    pub poll_jitter_ms: u64,
    pub request_timeout_ms: u64,
    /// Minimum gap between two accepted signals.
    pub dedupe_window_ms: u64,
    /// Pause between filling the form and submitting it.
    pub submit_delay_ms: u64,
    pub symbol: Option<String>,
    pub store_path: String,
    /// Balance reported by the paper order form.
    #[serde(with = "rust_decimal::serde::float")]
    pub paper_balance: Decimal,
    /// Market price reported by the paper order form.
    #[serde(with = "rust_decimal::serde::float")]
    pub paper_price: Decimal,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            client_id: "2".to_string(),
            mode: ConsumerMode::default(),
            ws_endpoints: vec![
                "ws://localhost:8788".to_string(),
                "ws://127.0.0.1:8788".to_string(),
                "ws://localhost:8787/ws".to_string(),
                "ws://127.0.0.1:8787/ws".to_string(),
            ],
            pull_endpoints: vec![
                "http://localhost:8787/pull".to_string(),
                "http://127.0.0.1:8787/pull".to_string(),
            ],
            notify_url: Some("http://localhost:8787/notify".to_string()),
            reconnect_delay_ms: 1200,
            poll_min_ms: 250,
            poll_max_ms: 1500,
            poll_backoff_factor: 1.6,
            poll_jitter_ms: 180,
            request_timeout_ms: 3000,
            dedupe_window_ms: 1000,
            submit_delay_ms: 500,
            symbol: None,
            store_path: "data/signal-store.json".to_string(),
            paper_balance: dec!(1000),
            paper_price: dec!(100),
        }
    }
}

impl ConsumerSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_millis(self.dedupe_window_ms)
    }

    pub fn submit_delay(&self) -> Duration {
        Duration::from_millis(self.submit_delay_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WatcherSettings {
    /// Counter sampling interval.
    pub poll_ms: u64,
    /// How long a raw change must hold before it is committed.
    pub stable_ms: u64,
    /// Minimum gap between two events of the same type.
    pub dedupe_ms: u64,
    pub auto_refresh: bool,
    pub refresh_every_ms: u64,
    pub max_refreshes_per_cycle: u32,
    pub pending_labels: Vec<String>,
    pub positions_labels: Vec<String>,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_ms: 350,
            stable_ms: 250,
            dedupe_ms: 1500,
            auto_refresh: true,
            refresh_every_ms: 5000,
            max_refreshes_per_cycle: 24,
            pending_labels: vec!["Pending".to_string()],
            positions_labels: vec![
                "Positions".to_string(),
                "Position".to_string(),
                "Posiciones".to_string(),
            ],
        }
    }
}

impl WatcherSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn stable_window(&self) -> Duration {
        Duration::from_millis(self.stable_ms)
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_millis(self.dedupe_ms)
    }

    pub fn refresh_every(&self) -> Duration {
        Duration::from_millis(self.refresh_every_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.server.port, 8787);
        assert_eq!(settings.server.ws_port, Some(8788));
        assert_eq!(settings.relay.queue_capacity, 200);
        assert_eq!(settings.consumer.mode, ConsumerMode::Pull);
        assert_eq!(settings.watcher.max_refreshes_per_cycle, 24);
        assert_eq!(settings.risk, RiskSettings::default());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_merge_with_defaults() {
        let raw = r#"
            [consumer]
            client_id = "7"
            mode = "both"
            paper_balance = 2500

            [risk]
            leverage = 10.0
            allowUnsafe = true
        "#;
        let settings: Settings = toml::from_str(raw).unwrap();
        assert_eq!(settings.consumer.client_id, "7");
        assert!(settings.consumer.mode.uses_push());
        assert!(settings.consumer.mode.uses_pull());
        assert_eq!(settings.consumer.paper_balance, dec!(2500));
        assert_eq!(settings.consumer.poll_max_ms, 1500);
        assert_eq!(settings.risk.leverage, dec!(10));
        assert!(settings.risk.allow_unsafe);
        assert_eq!(settings.risk.maintenance_margin_rate, dec!(0.005));
    }

    #[test]
    fn test_validation_catches_bad_windows() {
        let mut settings = Settings::default();
        settings.consumer.poll_min_ms = 2000;
        assert!(matches!(settings.validate(), Err(Error::Invalid(_))));

        let mut settings = Settings::default();
        settings.consumer.mode = ConsumerMode::Push;
        settings.consumer.ws_endpoints.clear();
        assert!(settings.validate().is_err());
    }
}
