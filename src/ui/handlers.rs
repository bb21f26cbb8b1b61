//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::audio::device::{list_output_devices, OutputDeviceInfo};
use crate::pipeline::{PipelineHandle, PipelineStatus};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn not_ready<T>() -> ApiResult<T> {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::error("audio pipeline not ready")),
    )
}

fn respond<T>(result: crate::Result<T>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(crate::Error::Pipeline(_)) => not_ready(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

fn pipeline(state: &AppState) -> Option<&PipelineHandle> {
    state.pipeline.as_ref()
}

/// Current pipeline status
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<PipelineStatus> {
    match pipeline(&state) {
        Some(pipeline) => (StatusCode::OK, Json(ApiResponse::ok(pipeline.status()))),
        None => not_ready(),
    }
}

/// Available output devices
pub async fn get_devices() -> Json<ApiResponse<Vec<OutputDeviceInfo>>> {
    let devices = tokio::task::spawn_blocking(list_output_devices)
        .await
        .unwrap_or_default();
    Json(ApiResponse::ok(devices))
}

pub async fn start(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    match pipeline(&state) {
        Some(pipeline) => respond(pipeline.start().await),
        None => not_ready(),
    }
}

pub async fn stop(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    match pipeline(&state) {
        Some(pipeline) => respond(pipeline.stop().await),
        None => not_ready(),
    }
}

/// Force a rebuffer
pub async fn reset(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    match pipeline(&state) {
        Some(pipeline) => respond(pipeline.reset().await),
        None => not_ready(),
    }
}

/// Set volume
#[derive(serde::Deserialize)]
pub struct VolumeRequest {
    pub volume: u8,
}

pub async fn set_volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult<u8> {
    if req.volume > 100 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("volume must be 0-100")),
        );
    }
    match pipeline(&state) {
        Some(pipeline) => respond(pipeline.set_volume(req.volume).await),
        None => not_ready(),
    }
}

/// Set mute state
#[derive(serde::Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

pub async fn set_mute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MuteRequest>,
) -> ApiResult<()> {
    match pipeline(&state) {
        Some(pipeline) => respond(pipeline.set_mute(req.muted).await),
        None => not_ready(),
    }
}
