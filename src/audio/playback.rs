//! Audio playback to an output device
//!
//! The cpal output stream lives on its own thread (cpal streams cannot move
//! between threads on every platform). Its data callback is the render
//! context: it owns the [`StreamConsumer`] and asks it for one render
//! quantum at a time, fanning the mono samples out to every device channel.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig, SupportedBufferSize};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::consumer::StreamConsumer;
use crate::audio::device::find_output_device;
use crate::error::AudioError;

/// How long the control plane waits for the playback thread to answer
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Host of the render callback, as seen from the control plane
pub trait RenderOutput: Send {
    /// Start (or resume) invoking the render callback
    fn resume(&mut self) -> Result<(), AudioError>;

    /// Stop invoking the render callback
    fn suspend(&mut self) -> Result<(), AudioError>;

    /// Next asynchronous stream error, if any
    fn poll_error(&mut self) -> Option<AudioError> {
        None
    }
}

enum PlaybackCommand {
    Play,
    Pause,
    Shutdown,
}

/// Output stream parameters
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub device_id: Option<String>,
    pub sample_rate: u32,
    /// Frames per render period
    pub render_quantum: u32,
}

/// cpal-backed render host
pub struct AudioPlayback {
    commands: Sender<PlaybackCommand>,
    replies: Receiver<Result<(), AudioError>>,
    errors: Receiver<AudioError>,
    thread_handle: Option<JoinHandle<()>>,
    channels: u16,
}

impl AudioPlayback {
    /// Open the output device and build a paused stream around `consumer`.
    pub fn new(config: PlaybackConfig, consumer: StreamConsumer) -> Result<Self, AudioError> {
        let (command_tx, command_rx) = bounded::<PlaybackCommand>(4);
        let (reply_tx, reply_rx) = bounded::<Result<(), AudioError>>(4);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<u16, AudioError>>(1);

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                let stream = match build_stream(&config, consumer, error_tx) {
                    Ok((stream, channels)) => {
                        let _ = ready_tx.send(Ok(channels));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    let result = match command {
                        PlaybackCommand::Play => stream
                            .play()
                            .map_err(|e| AudioError::StreamError(e.to_string())),
                        PlaybackCommand::Pause => stream
                            .pause()
                            .map_err(|e| AudioError::StreamError(e.to_string())),
                        PlaybackCommand::Shutdown => break,
                    };
                    let _ = reply_tx.send(result);
                }

                // Stream is dropped here, stopping playback
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let channels = ready_rx
            .recv()
            .map_err(|_| AudioError::PlaybackGone)??;

        Ok(Self {
            commands: command_tx,
            replies: reply_rx,
            errors: error_rx,
            thread_handle: Some(handle),
            channels,
        })
    }

    /// Channel count of the opened device
    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn command(&self, command: PlaybackCommand) -> Result<(), AudioError> {
        self.commands
            .send(command)
            .map_err(|_| AudioError::PlaybackGone)?;
        self.replies
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|_| AudioError::PlaybackGone)?
    }
}

impl RenderOutput for AudioPlayback {
    fn resume(&mut self) -> Result<(), AudioError> {
        self.command(PlaybackCommand::Play)
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        self.command(PlaybackCommand::Pause)
    }

    fn poll_error(&mut self) -> Option<AudioError> {
        self.errors.try_recv().ok()
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        let _ = self.commands.send(PlaybackCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn build_stream(
    config: &PlaybackConfig,
    mut consumer: StreamConsumer,
    error_tx: Sender<AudioError>,
) -> Result<(cpal::Stream, u16), AudioError> {
    let device = find_output_device(config.device_id.as_deref())?;
    let default_config = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    if default_config.sample_format() != SampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?} output (need f32)",
            default_config.sample_format()
        )));
    }

    let quantum = config.render_quantum.max(1);
    let buffer_size = match default_config.buffer_size() {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&quantum) => {
            cpal::BufferSize::Fixed(quantum)
        }
        _ => cpal::BufferSize::Default,
    };

    let channels = default_config.channels();
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size,
    };

    tracing::info!(
        "Opening output stream: {} Hz, {} channels, {:?}",
        config.sample_rate,
        channels,
        stream_config.buffer_size
    );

    let frame_width = channels.max(1) as usize;
    let quantum = quantum as usize;
    let mut scratch = vec![0.0f32; quantum];

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for block in data.chunks_mut(quantum * frame_width) {
                    let frames = block.len() / frame_width;
                    let mono = &mut scratch[..frames];
                    consumer.render(mono);

                    for (frame, sample) in block.chunks_mut(frame_width).zip(mono.iter()) {
                        frame.fill(*sample);
                    }
                }
            },
            move |err| {
                let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    // Some backends start streams on creation; stay silent until resumed.
    stream
        .pause()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    Ok((stream, channels))
}
