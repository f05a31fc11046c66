// In crates/engine/tests/relay_to_order.rs

use app_config::{ConsumerMode, ConsumerSettings, RelaySettings};
use async_trait::async_trait;
use engine::ConsumerSession;
use events::{Notification, NotificationKind, Notifier};
use execution::{ExecutionOrchestrator, PaperOrderForm};
use relay_client::HttpNotifier;
use risk::RiskSettings;
use rust_decimal_macros::dec;
use serde_json::json;
use signal_store::SignalStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use web_server::AppState;

#[derive(Default)]
struct Captured(Mutex<Vec<Notification>>);

#[async_trait]
impl Notifier for Captured {
    async fn notify(&self, n: &Notification) -> events::Result<()> {
        self.0.lock().unwrap().push(n.clone());
        Ok(())
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_ingress_signal_becomes_a_submitted_order() {
    // --- 1. Relay ---
    let received = Arc::new(Captured::default());
    let state = AppState::new(&RelaySettings::default(), 0, received.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let router = web_server::create_router(state.clone(), 64 * 1024);
    tokio::spawn(async move { axum::serve(listener, router).await });
    let base = format!("http://{address}");

    // --- 2. Consumer on a paper form, notifying back through the relay ---
    let form = Arc::new(PaperOrderForm::new(dec!(1000), None).with_symbol("SOL-PERP"));
    let store = SignalStore::in_memory();
    let notifier = Arc::new(HttpNotifier::new(format!("{base}/notify"), Duration::from_secs(2)).unwrap());
    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        form.clone(),
        store.clone(),
        notifier,
        RiskSettings {
            risk_percent_of_balance: dec!(2),
            ..RiskSettings::default()
        },
        Duration::ZERO,
    ));
    let settings = ConsumerSettings {
        mode: ConsumerMode::Pull,
        pull_endpoints: vec![format!("{base}/pull")],
        poll_min_ms: 10,
        poll_max_ms: 50,
        poll_jitter_ms: 0,
        dedupe_window_ms: 0,
        submit_delay_ms: 0,
        notify_url: None,
        ..ConsumerSettings::default()
    };
    let session = ConsumerSession::new(settings, orchestrator);
    let pipeline = session.pipeline();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(session.run(shutdown.clone()));

    // --- 3. Ingress ---
    let http = reqwest::Client::new();
    let post = |body: serde_json::Value| {
        let request = http.post(format!("{base}/tv")).json(&body);
        async move {
            let response = request.send().await.unwrap();
            assert!(response.status().is_success());
        }
    };

    post(json!({"side": "long", "atr": 2, "price": 100, "clientId": "2"})).await;
    wait_until("the first order", || form.submitted() == 1).await;
    wait_until("the open notification", || !received.0.lock().unwrap().is_empty()).await;

    let open = received.0.lock().unwrap()[0].clone();
    assert_eq!(open.kind, NotificationKind::OpenOperation);
    assert_eq!(open.take_profit, Some(dec!(104)));
    assert_eq!(open.stop_loss, Some(dec!(97)));
    assert_eq!(open.quantity, Some(dec!(6.666)));
    assert_eq!(open.symbol.as_deref(), Some("SOL-PERP"));
    assert_eq!(store.atr().unwrap(), Some(dec!(2)));

    // A repeated side is dropped; the flip goes through in queue order.
    post(json!({"side": "long", "atrBin": "2", "price": 100, "clientId": "2"})).await;
    post(json!({"side": "short", "atr": 2, "price": 100, "clientId": "2"})).await;
    wait_until("the flip", || form.submitted() == 2).await;
    assert_eq!((pipeline.handled(), pipeline.ignored()), (2, 1));
    assert_eq!(store.last_signal().unwrap().unwrap().side(), core_types::Side::Short);
    assert!(state.bus.is_empty("2"));

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
