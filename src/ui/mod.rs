//! Web control surface: JSON over HTTP plus a WebSocket for audio, requests and events

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{router, AppState, WebServer};
