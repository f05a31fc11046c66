// In app/src/main.rs

use anyhow::{Context, Result};
use app_config::Settings;
use clap::{Parser, Subcommand};
use core_types::{Side, TradeSignal};
use engine::Engine;
use events::LogNotifier;
use risk::{FieldPrecision, RiskSettings, compute_order_parameters};
use rust_decimal::Decimal;
use signal_store::SignalStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Relays trading signals to consumers and turns them into risk-sized orders."
)]
struct Cli {
    /// Read settings from this TOML file instead of the layered config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the relay: ingress, per-client queues, push and notify.
    Serve,

    /// Runs a consumer session against the paper order form.
    Consume {
        /// Also watch the form's pending/positions counters.
        #[arg(long)]
        watch: bool,
    },

    /// Computes one order with the current settings and prints it as JSON.
    Quote {
        /// "long" or "short".
        #[arg(short, long)]
        side: Side,

        /// Entry price.
        #[arg(short, long)]
        entry: Decimal,

        /// Average true range of the signal.
        #[arg(short, long)]
        atr: Decimal,

        /// Account balance. Defaults to the paper balance.
        #[arg(short, long)]
        balance: Option<Decimal>,

        /// Decimal places of every form field. Defaults to 3.
        #[arg(long)]
        decimals: Option<u32>,
    },

    /// Shows or updates the persisted risk settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Prints the effective risk settings.
    Show,

    /// Updates the given risk settings. Omitted ones keep their value.
    Set(RiskOverrides),
}

#[derive(clap::Args, Debug, Default)]
struct RiskOverrides {
    #[arg(long)]
    leverage: Option<Decimal>,
    #[arg(long)]
    maintenance_margin_rate: Option<Decimal>,
    #[arg(long)]
    liquidation_buffer: Option<Decimal>,
    #[arg(long)]
    max_notional: Option<Decimal>,
    #[arg(long)]
    risk_percent: Option<Decimal>,
    #[arg(long)]
    allow_unsafe: Option<bool>,
    #[arg(long)]
    tp_multiple: Option<Decimal>,
    #[arg(long)]
    sl_multiple: Option<Decimal>,
    #[arg(long)]
    entry_offset: Option<Decimal>,
    #[arg(long)]
    reject_crossed: Option<bool>,
}

impl RiskOverrides {
    fn apply(self, settings: &mut RiskSettings) {
        let RiskOverrides {
            leverage,
            maintenance_margin_rate,
            liquidation_buffer,
            max_notional,
            risk_percent,
            allow_unsafe,
            tp_multiple,
            sl_multiple,
            entry_offset,
            reject_crossed,
        } = self;
        if let Some(v) = leverage {
            settings.leverage = v;
        }
        if let Some(v) = maintenance_margin_rate {
            settings.maintenance_margin_rate = v;
        }
        if let Some(v) = liquidation_buffer {
            settings.liquidation_buffer_atr_multiple = v;
        }
        if let Some(v) = max_notional {
            settings.max_notional = v;
        }
        if let Some(v) = risk_percent {
            settings.risk_percent_of_balance = v;
        }
        if let Some(v) = allow_unsafe {
            settings.allow_unsafe = v;
        }
        if let Some(v) = tp_multiple {
            settings.atr_take_profit_multiple = v;
        }
        if let Some(v) = sl_multiple {
            settings.atr_stop_loss_multiple = v;
        }
        if let Some(v) = entry_offset {
            settings.entry_offset_ratio = v;
        }
        if let Some(v) = reject_crossed {
            settings.reject_crossed_targets = v;
        }
    }
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => app_config::load_settings_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => app_config::load_settings().context("Failed to load settings")?,
    };

    // --- Tracing Setup ---
    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.app.log_level.as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(environment = %settings.app.environment, "Starting signal-bridge");

    match cli.command {
        Commands::Serve => handle_serve(settings).await?,
        Commands::Consume { watch } => handle_consume(settings, watch).await?,
        Commands::Quote {
            side,
            entry,
            atr,
            balance,
            decimals,
        } => handle_quote(&settings, side, entry, atr, balance, decimals)?,
        Commands::Settings { action } => handle_settings(&settings, action)?,
    }

    tracing::info!("signal-bridge has finished successfully.");
    Ok(())
}

/// A token cancelled on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C.");
            return;
        }
        tracing::info!("Ctrl-C received. Shutting down...");
        trigger.cancel();
    });
    token
}

// --- "Serve" Subcommand Logic ---

async fn handle_serve(settings: Settings) -> Result<()> {
    let shutdown = shutdown_on_ctrl_c();
    web_server::run(
        &settings.server,
        &settings.relay,
        Arc::new(LogNotifier),
        shutdown,
    )
    .await
    .context("Relay server failed")?;
    Ok(())
}

// --- "Consume" Subcommand Logic ---

async fn handle_consume(settings: Settings, watch: bool) -> Result<()> {
    let shutdown = shutdown_on_ctrl_c();
    Engine::new(settings, watch).run(shutdown).await
}

// --- "Quote" Subcommand Logic ---

fn handle_quote(
    settings: &Settings,
    side: Side,
    entry: Decimal,
    atr: Decimal,
    balance: Option<Decimal>,
    decimals: Option<u32>,
) -> Result<()> {
    let store = open_store(settings)?;
    let risk_settings = store.risk_settings(&settings.risk)?;

    let signal = TradeSignal::new(
        side,
        Some(entry),
        atr,
        chrono::Utc::now().timestamp_millis(),
        settings.consumer.client_id.clone(),
    )?;
    let precision = FieldPrecision {
        price: decimals,
        take_profit: decimals,
        stop_loss: decimals,
        quantity: decimals,
    };
    let balance = balance.unwrap_or(settings.consumer.paper_balance);

    let order = compute_order_parameters(&signal, &risk_settings, entry, balance, &precision)?;
    println!("{}", serde_json::to_string_pretty(&order)?);
    Ok(())
}

// --- "Settings" Subcommand Logic ---

fn handle_settings(settings: &Settings, action: SettingsAction) -> Result<()> {
    let store = open_store(settings)?;
    let effective = match action {
        SettingsAction::Show => store.risk_settings(&settings.risk)?,
        SettingsAction::Set(overrides) => {
            let updated = store.update_risk_settings(&settings.risk, |risk| overrides.apply(risk))?;
            tracing::info!(path = %settings.consumer.store_path, "Risk settings updated.");
            updated
        }
    };
    println!("{}", serde_json::to_string_pretty(&effective)?);
    Ok(())
}

fn open_store(settings: &Settings) -> Result<SignalStore> {
    let path = &settings.consumer.store_path;
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    SignalStore::open(path).with_context(|| format!("Failed to open signal store at {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_parses_quote_and_settings() {
        let cli = Cli::parse_from([
            "signal-bridge", "quote", "--side", "short", "--entry", "100", "--atr", "2",
        ]);
        match cli.command {
            Commands::Quote { side, entry, atr, balance, .. } => {
                assert_eq!((side, entry, atr, balance), (Side::Short, dec!(100), dec!(2), None));
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from([
            "signal-bridge", "--config", "x.toml", "settings", "set", "--leverage", "10",
            "--allow-unsafe", "true",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        let Commands::Settings { action: SettingsAction::Set(overrides) } = cli.command else {
            panic!("expected settings set");
        };
        let mut risk = RiskSettings::default();
        overrides.apply(&mut risk);
        assert_eq!(risk.leverage, dec!(10));
        assert!(risk.allow_unsafe);
        assert_eq!(risk.risk_percent_of_balance, dec!(2.5));
    }

    #[test]
    fn test_consume_watch_flag() {
        let cli = Cli::parse_from(["signal-bridge", "consume", "--watch"]);
        assert!(matches!(cli.command, Commands::Consume { watch: true }));
    }
}
