//! WebSocket endpoint
//!
//! Binary messages are audio frames and go straight to the pipeline. Text
//! messages are control requests answered with a response carrying the same
//! id. Pipeline events are pushed as `{event, payload}` text messages.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response as HttpResponse};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::error::PipelineError;
use crate::pipeline::PipelineHandle;
use crate::protocol::{parse_frame, ControlMethod, EventMessage, Frame, Incoming, Request, Response};
use crate::ui::server::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> HttpResponse {
    match state.pipeline.clone() {
        Some(pipeline) => ws.on_upgrade(move |socket| handle_socket(socket, pipeline)),
        None => (StatusCode::SERVICE_UNAVAILABLE, "audio pipeline not ready").into_response(),
    }
}

async fn handle_socket(mut socket: WebSocket, pipeline: PipelineHandle) {
    let mut events = pipeline.subscribe();
    tracing::info!("WebSocket client connected");

    loop {
        tokio::select! {
            message = socket.recv() => {
                let Some(Ok(message)) = message else { break };
                let reply = match message {
                    Message::Binary(data) => on_frame(&pipeline, Frame::Binary(&data)).await,
                    Message::Text(text) => on_frame(&pipeline, Frame::Text(&text)).await,
                    Message::Close(_) => break,
                    _ => Ok(Vec::new()),
                };
                let Ok(reply) = reply else {
                    tracing::info!("Pipeline closed, dropping WebSocket client");
                    break;
                };
                for text in reply {
                    if socket.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("WebSocket client disconnected");
}

/// Handle one incoming frame, returning any text messages to send back.
///
/// Fails only when the pipeline has shut down.
async fn on_frame(
    pipeline: &PipelineHandle,
    frame: Frame<'_>,
) -> Result<Vec<String>, PipelineError> {
    let reply = match parse_frame(frame) {
        Ok(Incoming::Audio(samples)) => {
            pipeline.on_audio_data(samples)?;
            Vec::new()
        }
        Ok(Incoming::Request(request)) => dispatch(pipeline, &request)
            .await
            .into_iter()
            .filter_map(|message| message.ok())
            .collect(),
        Ok(other) => {
            tracing::warn!("Unexpected message from client: {:?}", other);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Bad frame from client: {}", e);
            Vec::new()
        }
    };
    Ok(reply)
}

/// Execute a control request; the response comes first, then any event
pub async fn dispatch(
    pipeline: &PipelineHandle,
    request: &Request,
) -> Vec<Result<String, serde_json::Error>> {
    let method = match ControlMethod::from_request(request) {
        Ok(method) => method,
        Err(e) => return vec![serde_json::to_string(&Response::error(request.id, e.to_string()))],
    };

    let result = match method {
        ControlMethod::Start => pipeline.start().await,
        ControlMethod::Stop => pipeline.stop().await,
        ControlMethod::Reset => pipeline.reset().await,
        ControlMethod::SetVolume(volume) => pipeline.set_volume(volume).await.map(|_| ()),
        ControlMethod::SetMute(muted) => pipeline.set_mute(muted).await,
        ControlMethod::Status => {
            let status = serde_json::to_value(pipeline.status());
            return match status {
                Ok(payload) => vec![
                    serde_json::to_string(&Response::ok(request.id)),
                    serde_json::to_string(&EventMessage {
                        event: "status".to_string(),
                        payload,
                    }),
                ],
                Err(e) => vec![Err(e)],
            };
        }
    };

    let response = match result {
        Ok(()) => Response::ok(request.id),
        Err(e) => Response::error(request.id, e.to_string()),
    };
    vec![serde_json::to_string(&response)]
}
