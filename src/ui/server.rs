//! HTTP server setup

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::error::NetworkError;
use crate::pipeline::PipelineHandle;
use crate::ui::{handlers, websocket};

/// Shared state for all routes
pub struct AppState {
    /// `None` when the audio pipeline could not be built
    pub pipeline: Option<PipelineHandle>,
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/devices", get(handlers::get_devices))
        .route("/api/start", post(handlers::start))
        .route("/api/stop", post(handlers::stop))
        .route("/api/reset", post(handlers::reset))
        .route("/api/volume", post(handlers::set_volume))
        .route("/api/mute", post(handlers::set_mute))
        .route("/ws", get(websocket::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Control surface server
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, pipeline: Option<PipelineHandle>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { pipeline }),
        }
    }

    /// Bind and serve on a background task
    pub async fn start_background(self) -> Result<(SocketAddr, JoinHandle<()>), NetworkError> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let app = router(self.state);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok((local_addr, handle))
    }
}
