//! `JunctionServer` — axum HTTP + WebSocket server assembly.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Json;
use axum::routing::{get, post};
use junction_rpc::{Dispatcher, Registry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::http;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::hub::Hub;
use crate::websocket::session;

/// Shared state accessible from axum handlers.
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Dispatch core over the registered codec map.
    pub dispatcher: Dispatcher,
    /// Connection hub for the WebSocket binding.
    pub hub: Hub,
    /// Token observed by every connection task.
    pub shutdown: CancellationToken,
    /// Tracker following the session tasks, drained on shutdown.
    pub sessions: TaskTracker,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// State with a standalone shutdown token and session tracker.
    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        Self::with_shutdown(config, dispatcher, CancellationToken::new(), TaskTracker::new())
    }

    /// State whose connection tasks observe `shutdown` and report into
    /// `sessions`.
    pub fn with_shutdown(
        config: ServerConfig,
        dispatcher: Dispatcher,
        shutdown: CancellationToken,
        sessions: TaskTracker,
    ) -> Self {
        Self {
            config,
            dispatcher,
            hub: Hub::new(),
            shutdown,
            sessions,
            start_time: Instant::now(),
        }
    }
}

/// The assembled server: both transport bindings over one registry.
pub struct JunctionServer {
    state: Arc<AppState>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl JunctionServer {
    /// Create a server serving `registry` with `config`.
    pub fn new(config: ServerConfig, registry: Registry) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let dispatcher =
            Dispatcher::new(Arc::new(registry)).with_handler_timeout(config.handler_timeout());
        let state = Arc::new(AppState::with_shutdown(
            config,
            dispatcher,
            shutdown.token(),
            shutdown.tracker(),
        ));
        Self { state, shutdown }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route(&self.state.config.rpc_path, post(http::rpc_handler))
            .route(&self.state.config.ws_path, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address. Port `0` picks a free port; read it
    /// back from the listener's local address.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        TcpListener::bind(&addr).await
    }

    /// Serve on an already-bound listener until shutdown is initiated.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "listening");
        let token = self.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
    }

    /// Bind and serve until shutdown is initiated.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve_on(listener).await
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the shared handler state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let connections = state.hub.count().await;
    let methods = state.dispatcher.registry().methods();
    Json(health::health_check(state.start_time, connections, methods))
}

/// GET {ws_path} — WebSocket upgrade into a tracked session.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let sessions = state.sessions.clone();
    ws.max_message_size(state.config.max_frame_size)
        .on_upgrade(move |socket| sessions.track_future(session::run_session(socket, state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use junction_rpc::JsonCodec;
    use tower::ServiceExt;

    fn make_server() -> JunctionServer {
        let mut registry = Registry::new();
        registry
            .register(
                "add",
                JsonCodec::new(|(a, b): (i64, i64)| async move { Ok(a + b) }),
            )
            .unwrap();
        JunctionServer::new(ServerConfig::default(), registry)
    }

    #[test]
    fn server_constructs_without_a_runtime() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["methods"], serde_json::json!(["add"]));
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn rpc_route_rejects_get_with_405() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder().uri("/rpc").body(Body::empty()).unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let app = server.router();

        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_paths_respected() {
        let config = ServerConfig {
            rpc_path: "/api/rpc".into(),
            ..ServerConfig::default()
        };
        let server = JunctionServer::new(config, Registry::new());
        let app = server.router();

        let req = Request::builder()
            .method("POST")
            .uri("/api/rpc")
            .body(Body::from(r#"{"jsonrpc":"2.0","method":"x","id":1}"#))
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn shutdown_propagates_to_state_token() {
        let server = make_server();
        assert!(!server.state().shutdown.is_cancelled());
        server.shutdown().shutdown();
        assert!(server.state().shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn bind_on_ephemeral_port() {
        let server = make_server();
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
