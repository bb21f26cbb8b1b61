//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory. Every section
//! has defaults, so a partial file (or none at all) is fine.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub buffer: BufferConfig,
    pub volume: VolumeConfig,
    pub network: NetworkConfig,
    pub ui: UiConfig,
}

/// Output stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Frames rendered per callback period
    pub render_quantum: u32,
    /// Output device ID; the default device when absent
    pub device_id: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            render_quantum: DEFAULT_RENDER_QUANTUM,
            device_id: None,
        }
    }
}

/// Jitter buffer sizing and rebuffering thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Seconds of audio the ring buffer can hold
    pub capacity_seconds: f32,
    /// Fraction of capacity that counts as a level of 1.0
    pub reference_fraction: f32,
    /// Fraction of the reference window buffered before playback starts
    pub priming_level: f32,
    pub underrun_level: f32,
    pub overrun_level: f32,
    pub monitor_period_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity_seconds: DEFAULT_BUFFER_SECONDS,
            reference_fraction: 0.5,
            priming_level: 0.5,
            underrun_level: DEFAULT_UNDERRUN_LEVEL,
            overrun_level: DEFAULT_OVERRUN_LEVEL,
            monitor_period_ms: DEFAULT_MONITOR_PERIOD_MS,
        }
    }
}

/// Volume settings; `level` is persisted whenever it changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub level: u8,
    pub ramp_ms: u32,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_VOLUME,
            ramp_ms: DEFAULT_VOLUME_RAMP_MS,
        }
    }
}

/// UDP audio ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub udp_port: u16,
    pub recv_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            udp_port: DEFAULT_UDP_PORT,
            recv_buffer_size: 1 << 20,
        }
    }
}

/// HTTP/WebSocket control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the stream cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let buffer = &self.buffer;

        if self.audio.sample_rate == 0 {
            return invalid("audio.sample_rate must be positive");
        }
        if self.audio.render_quantum == 0 {
            return invalid("audio.render_quantum must be positive");
        }
        if !(buffer.capacity_seconds > 0.0) {
            return invalid("buffer.capacity_seconds must be positive");
        }
        if !(buffer.reference_fraction > 0.0 && buffer.reference_fraction <= 1.0) {
            return invalid("buffer.reference_fraction must be in (0, 1]");
        }
        if !(buffer.priming_level > 0.0) {
            return invalid("buffer.priming_level must be positive");
        }
        if !(buffer.underrun_level >= 0.0 && buffer.underrun_level < buffer.overrun_level) {
            return invalid("buffer.underrun_level must be below buffer.overrun_level");
        }
        if buffer.monitor_period_ms == 0 {
            return invalid("buffer.monitor_period_ms must be positive");
        }

        let capacity = (self.audio.sample_rate as f64 * buffer.capacity_seconds as f64).round();
        if capacity < 2.0 {
            return invalid("buffer too small: fewer than 2 slots");
        }
        let priming = capacity * buffer.reference_fraction as f64 * buffer.priming_level as f64;
        if priming.round() >= capacity {
            return invalid("priming threshold does not fit in the buffer");
        }
        if self.volume.level > 100 {
            return invalid("volume.level must be 0-100");
        }

        Ok(())
    }

    /// Volume ramp length in samples at the configured rate
    pub fn ramp_samples(&self) -> u32 {
        (self.audio.sample_rate as u64 * self.volume.ramp_ms as u64 / 1000) as u32
    }
}

/// A configuration bound to the file it was loaded from
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    pub config: AppConfig,
}

impl ConfigFile {
    /// Default location: `<config dir>/radio-audio-streamer/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "radio-audio-streamer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from `path`, using defaults if the file does not exist yet
    pub fn load_or_default(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(text) => AppConfig::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                AppConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the configuration back, creating parent directories as needed
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, self.config.to_toml()?)?;
        Ok(())
    }
}
