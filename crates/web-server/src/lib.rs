// In crates/web-server/src/lib.rs

//! The relay: accepts producer signals over HTTP, queues them per client and
//! pushes them to connected consumers over WebSocket.

use app_config::{RelaySettings, ServerSettings};
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Json},
    routing::{get, post},
};
use core_types::TradeSignal;
use events::Notifier;
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use types::{Ack, ClientQuery, Health, PullResponse};

pub mod bus;
pub mod error;
pub mod payload;
pub mod registry;
pub mod types;

// Re-export our custom error type for convenience.
pub use bus::ClientMessageBus;
pub use error::{Error, Result};
pub use registry::ClientRegistry;

pub const SERVICE_NAME: &str = "signal-bridge";

/// The shared application state that is available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<ClientMessageBus<TradeSignal>>,
    pub registry: Arc<ClientRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub http_port: u16,
}

impl AppState {
    pub fn new(relay: &RelaySettings, http_port: u16, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            bus: Arc::new(ClientMessageBus::new(
                relay.queue_capacity,
                relay.default_client_id.clone(),
            )),
            registry: Arc::new(ClientRegistry::new()),
            notifier,
            http_port,
        }
    }
}

/// Creates the main relay router with all routes and middleware.
///
/// # Arguments
///
/// * `app_state`: The shared `AppState` holding the bus, registry and notifier.
/// * `body_limit`: Maximum accepted request body, in bytes.
///
/// # Returns
///
/// The configured `axum::Router`.
pub fn create_router(app_state: AppState, body_limit: usize) -> Router {
    // Producers run inside third-party pages, so any origin is allowed.
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/tv", post(ingest_signal_handler))
        .route("/pull", get(pull_handler))
        .route("/notify", post(notify_handler))
        .route("/health", get(health_check_handler))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// A router serving only the WebSocket upgrade, at `/`.
pub fn create_ws_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(app_state)
}

/// The handler for `POST /tv`.
///
/// The signal is always mirrored into the client's queue so a consumer that
/// is offline, or only polls, can still pick it up. It is then pushed to the
/// client's live connection, if any.
async fn ingest_signal_handler(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
    body: String,
) -> Result<Json<Ack>> {
    let now = chrono::Utc::now().timestamp_millis();
    let signal = match payload::normalize_signal(&body, query.client_id(), now) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected ingress payload.");
            return Err(e);
        }
    };
    let client_id = signal.client_id().to_string();

    // --- 1. Mirror into the queue ---
    state.bus.enqueue(&client_id, signal.clone());

    // --- 2. Push to the live connection ---
    let text = serde_json::to_string(&signal)?;
    match state.registry.deliver(&client_id, text) {
        Ok(()) => tracing::info!(%client_id, side = %signal.side(), atr = %signal.atr(), "Signal pushed."),
        Err(e) => tracing::warn!(%client_id, side = %signal.side(), reason = %e, "Signal queued without push."),
    }

    Ok(Json(Ack::ok()))
}

/// The handler for `GET /pull`. Consumes at most one message.
async fn pull_handler(
    State(state): State<AppState>,
    Query(query): Query<ClientQuery>,
) -> Json<PullResponse> {
    let client_id = query.client_id().unwrap_or_default();
    let msg = state.bus.dequeue(client_id);
    if let Some(signal) = &msg {
        tracing::debug!(client_id = signal.client_id(), side = %signal.side(), "Signal pulled.");
    }
    Json(PullResponse { ok: true, msg })
}

/// The handler for `POST /notify`.
async fn notify_handler(State(state): State<AppState>, body: String) -> Result<Json<Ack>> {
    let now = chrono::Utc::now().timestamp_millis();
    let notification = payload::normalize_notification(&body, now)?;
    state.notifier.notify(&notification).await?;
    Ok(Json(Ack::ok()))
}

async fn health_check_handler(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        ok: true,
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        http: format!("http://localhost:{}/tv", state.http_port),
    })
}

/// The handler for `GET /ws`.
/// Upgrades the connection and binds it to the requested client id, or to a
/// generated one.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ClientQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let client_id = query
        .client_id()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

/// Forwards pushed signals to the socket until either side goes away.
async fn handle_socket(socket: WebSocket, client_id: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection_id = state.registry.register(&client_id, tx);
    tracing::info!(%client_id, "WebSocket consumer connected.");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(text) = outbound else {
                    // A newer connection for the same client took the registry entry.
                    tracing::info!(%client_id, "WebSocket connection replaced by a newer one.");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    tracing::info!(%client_id, "WebSocket consumer disconnected.");
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(%client_id, "WebSocket consumer sent close frame.");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%client_id, error = %e, "WebSocket receive error.");
                        break;
                    }
                    // Consumers do not send commands; pings are answered by axum.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.registry.unregister(&client_id, connection_id);
    tracing::info!(%client_id, "WebSocket consumer connection closed.");
}

/// Runs the relay until `shutdown` is cancelled.
///
/// Serves the main router on `settings.port` and, when configured, the
/// WebSocket-only router on `settings.ws_port`.
pub async fn run(
    settings: &ServerSettings,
    relay: &RelaySettings,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app_state = AppState::new(relay, settings.port, notifier);
    let app = create_router(app_state.clone(), settings.body_limit_kb * 1024);

    let address = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(Error::ServerBindError)?;
    tracing::info!("Relay listening on http://{}/tv", address);

    let http = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    match settings.ws_port {
        Some(ws_port) => {
            let ws_address = format!("{}:{}", settings.host, ws_port);
            let ws_listener = TcpListener::bind(&ws_address)
                .await
                .map_err(Error::ServerBindError)?;
            tracing::info!("WebSocket listener on ws://{}", ws_address);

            let ws = axum::serve(ws_listener, create_ws_router(app_state).into_make_service())
                .with_graceful_shutdown(shutdown.cancelled_owned());
            tokio::try_join!(
                async { http.await.map_err(Error::ServeError) },
                async { ws.await.map_err(Error::ServeError) },
            )?;
        }
        None => http.await.map_err(Error::ServeError)?,
    }

    tracing::info!("Relay stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use events::LogNotifier;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(&RelaySettings::default(), 8787, Arc::new(LogNotifier))
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(uri: &str, content_type: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ingress_then_pull_in_order() {
        let router = create_router(test_state(), 64 * 1024);

        let (status, body) = send(
            &router,
            post("/tv?clientId=2", "text/plain", r#"{"side":"long","atr":1.5,"price":100}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (status, _) = send(
            &router,
            post("/tv", "application/json", r#"{"side":"short","atrBin":2,"clientId":"2"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, first) = send(&router, get("/pull?clientId=2")).await;
        assert_eq!(first["msg"]["type"], "tv_signal");
        assert_eq!(first["msg"]["side"], "long");
        assert_eq!(first["msg"]["atr"], 1.5);
        let (_, second) = send(&router, get("/pull?clientId=2")).await;
        assert_eq!(second["msg"]["side"], "short");
        let (_, empty) = send(&router, get("/pull?clientId=2")).await;
        assert_eq!(empty["ok"], true);
        assert!(empty["msg"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_ingress_is_rejected() {
        let state = test_state();
        let router = create_router(state.clone(), 64 * 1024);

        let (status, body) = send(
            &router,
            post("/tv", "text/plain", r#"{"side":"sideways","atr":1}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Field 'side' must be 'long' or 'short'");
        assert!(state.bus.client_ids().is_empty());
    }

    #[tokio::test]
    async fn test_ingress_pushes_to_connected_client() {
        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.registry.register("2", tx);
        let router = create_router(state.clone(), 64 * 1024);

        send(
            &router,
            post("/tv?clientId=2", "application/json", r#"{"side":"long","atr":3}"#),
        )
        .await;

        let pushed: TradeSignal = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(pushed.client_id(), "2");
        // The pushed signal is mirrored for replay.
        assert_eq!(state.bus.len("2"), 1);
    }

    #[tokio::test]
    async fn test_reconnect_closes_the_replaced_socket() {
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let state = test_state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let router = create_router(state.clone(), 64 * 1024);
        tokio::spawn(async move { axum::serve(listener, router).await });
        let url = format!("ws://{address}/ws?clientId=7");

        let (mut old, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        while !state.registry.is_connected("7") {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let (mut new, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();

        let ended = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                match old.next().await {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(ended.is_ok(), "replaced socket stayed open");

        state.registry.deliver("7", "after".to_string()).unwrap();
        let received = tokio::time::timeout(std::time::Duration::from_secs(5), new.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received.into_text().unwrap().as_str(), "after");
    }

    #[tokio::test]
    async fn test_notify_validation() {
        let router = create_router(test_state(), 64 * 1024);

        let (status, body) = send(
            &router,
            post("/notify", "application/json", r#"{"type":"open_operation"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);

        let (status, body) = send(
            &router,
            post("/notify", "text/plain", r#"{"type":"order_confirmed","symbol":"SOL"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_health_has_no_side_effects() {
        let state = test_state();
        let router = create_router(state.clone(), 64 * 1024);

        let (status, body) = send(&router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["service"], SERVICE_NAME);
        assert_eq!(body["http"], "http://localhost:8787/tv");
        assert!(state.bus.client_ids().is_empty());
    }
}
