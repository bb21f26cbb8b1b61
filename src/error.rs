//! Error types for the audio streaming application

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid ring buffer capacity: {0} (need at least 2 slots)")]
    InvalidCapacity(usize),

    #[error("Failed to allocate sample buffer of {0} slots")]
    BufferAllocation(usize),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Playback thread is gone")]
    PlaybackGone,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No configuration directory available")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Control protocol and frame decoding errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed audio frame: {0} bytes is not a whole number of f32 samples")]
    MalformedAudioFrame(usize),

    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized message")]
    UnknownMessage,

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameters for {0}")]
    InvalidParams(String),
}

/// Control-plane pipeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Audio pipeline not ready")]
    NotReady,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
