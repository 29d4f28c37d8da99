//! `PulseServer`: Axum HTTP + WebSocket server around one [`Hub`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handlers;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{SessionConfig, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The connection hub.
    pub hub: Arc<Hub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle rendered at `/metrics`.
    pub metrics: PrometheusHandle,
    /// Per-connection settings.
    pub session: SessionConfig,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
}

/// The Pulse server.
pub struct PulseServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl PulseServer {
    /// Create a server. Nothing runs until [`listen`](Self::listen).
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        Self {
            hub: Arc::new(Hub::with_drop_limit(config.slow_client_drop_limit)),
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            session: SessionConfig {
                queue_capacity: self.config.outbound_queue_capacity,
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
            },
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", get(handlers::home))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/posts", post(handlers::create_post))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener, start the hub loop, and serve until shutdown.
    ///
    /// Returns the bound address and the handle of the serving task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;

        let hub = self.hub.clone();
        let hub_token = self.shutdown.token();
        self.shutdown.track(tokio::spawn(async move {
            if let Err(e) = hub.run(hub_token).await {
                error!(error = %e, "hub loop failed to start");
            }
        }));

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "pulse server listening");
        Ok((addr, handle))
    }

    /// Signal shutdown and wait for the hub loop to close every client.
    pub async fn stop(&self) {
        self.shutdown
            .graceful_shutdown(Some(self.config.shutdown_timeout()))
            .await;
    }

    /// The connection hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.connection_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// GET /ws: upgrade and hand the socket to a session task.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let hub = state.hub.clone();
    let session = state.session;
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, hub, session))
}
