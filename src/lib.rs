//! # Radio Audio Streamer
//!
//! Plays a continuously arriving PCM stream from the network with bounded,
//! adaptive latency, without ever blocking the audio callback.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                      CONTROL PLANE (tokio task)                          │
//! │                                                                          │
//! │  UDP receiver ─┐                                                         │
//! │  (network)     │  on_audio_data   ┌────────────────────────────────┐     │
//! │                ├─────────────────▶│        StreamProducer          │     │
//! │  WebSocket  ───┤                  │  ingest ── RingWriter::write   │     │
//! │  (ui)          │  start/stop/     │  monitor ─ level / rebuffer    │     │
//! │  HTTP API   ───┘  volume/mute     │  volume ── SharedGain          │     │
//! │                                   └───────────────┬────────────────┘     │
//! └───────────────────────────────────────────────────┼──────────────────────┘
//!                                                     │
//!                        ┌────────────────────────────▼─────────────────┐
//!                        │ RingBuffer (atomic cursors, f32 slots)       │
//!                        │ StreamControl (reset handshake, counters)    │
//!                        └────────────────────────────┬─────────────────┘
//!                                                     │
//! ┌───────────────────────────────────────────────────┼──────────────────────┐
//! │                   RENDER CONTEXT (cpal callback)  ▼                      │
//! │                                   ┌────────────────────────────────┐     │
//! │                                   │        StreamConsumer          │     │
//! │                                   │  Priming ──▶ Streaming         │     │
//! │                                   │  RingReader::read, GainRamp    │     │
//! │                                   └───────────────┬────────────────┘     │
//! │                                                   ▼                      │
//! │                                             output device                │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod protocol;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default output sample rate
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Frames per render period
    pub const DEFAULT_RENDER_QUANTUM: u32 = 128;

    /// Seconds of audio the ring buffer holds
    pub const DEFAULT_BUFFER_SECONDS: f32 = 0.5;

    /// Rebuffer below this fill level
    pub const DEFAULT_UNDERRUN_LEVEL: f32 = 0.25;

    /// Rebuffer above this fill level
    pub const DEFAULT_OVERRUN_LEVEL: f32 = 1.75;

    /// Buffer monitor period in milliseconds
    pub const DEFAULT_MONITOR_PERIOD_MS: u64 = 1000;

    /// Initial volume (0-100)
    pub const DEFAULT_VOLUME: u8 = 75;

    /// Volume change ramp in milliseconds
    pub const DEFAULT_VOLUME_RAMP_MS: u32 = 500;

    /// Default UDP port for audio
    pub const DEFAULT_UDP_PORT: u16 = 5000;

    /// Default HTTP port for control
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Largest UDP payload
    pub const MAX_DATAGRAM_SIZE: usize = 65_507;

    /// Pending commands (including audio spans) queued for the control plane
    pub const COMMAND_QUEUE_CAPACITY: usize = 256;

    /// Events buffered per subscriber
    pub const EVENT_QUEUE_CAPACITY: usize = 64;
}
