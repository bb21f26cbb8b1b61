//! Control-plane pipeline
//!
//! A single tokio task owns the [`StreamProducer`] and therefore the write
//! side of the ring buffer. Network arrivals, UI commands and the periodic
//! buffer monitor are all serialized through it, so they interleave but never
//! run concurrently. Everyone else talks to it through a cloneable
//! [`PipelineHandle`].
//!
//! Resuming or suspending the output device and saving the config file block.
//! On a multi-threaded runtime that work runs under
//! [`tokio::task::block_in_place`] so other tasks keep their worker.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::audio::{
    stream_pair, AudioPlayback, BufferPolicy, IngestOutcome, PlaybackConfig, RebufferReason,
    RenderOutput, StreamProducer,
};
use crate::config::ConfigFile;
use crate::constants::{COMMAND_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY};
use crate::error::{AudioError, PipelineError, Result};

/// Notifications for observers (UI, logging, metrics)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started,
    Stopped,
    /// Sampled once per monitor period
    BufferLevel { level: f32 },
    /// Render periods that came up empty since the last monitor tick
    Underrun { count: u64 },
    /// A span that did not fit and was dropped
    Overrun { dropped: usize },
    Rebuffer { level: f32, reason: RebufferReason },
    Volume { volume: u8 },
    Mute { muted: bool },
}

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub volume: u8,
    pub muted: bool,
    pub buffer_level: f32,
    pub underruns: u64,
    pub overruns: u64,
    pub rebuffers: u64,
    pub discarded_samples: u64,
    pub last_rebuffer: Option<DateTime<Utc>>,
}

enum PipelineCommand {
    AudioData(Vec<f32>),
    Start(oneshot::Sender<std::result::Result<(), AudioError>>),
    Stop(oneshot::Sender<()>),
    Reset(oneshot::Sender<()>),
    SetVolume(u8, oneshot::Sender<u8>),
    SetMute(bool, oneshot::Sender<()>),
    Shutdown,
}

/// Cheap, cloneable access to a running pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<PipelineCommand>,
    events: broadcast::Sender<PipelineEvent>,
    status: Arc<RwLock<PipelineStatus>>,
}

impl PipelineHandle {
    /// Hand over freshly received samples. Never waits: if the control plane
    /// is backlogged the span is dropped like any other overrun.
    pub fn on_audio_data(&self, samples: Vec<f32>) -> std::result::Result<(), PipelineError> {
        match self.commands.try_send(PipelineCommand::AudioData(samples)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(PipelineCommand::AudioData(samples))) => {
                tracing::warn!("Pipeline backlog, dropping {} samples", samples.len());
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PipelineError::NotReady),
        }
    }

    /// Resume rendering and start accepting samples
    pub async fn start(&self) -> Result<()> {
        let result = self.request(PipelineCommand::Start).await?;
        Ok(result?)
    }

    /// Suspend rendering and discard buffered audio
    pub async fn stop(&self) -> Result<()> {
        Ok(self.request(PipelineCommand::Stop).await?)
    }

    /// Force a rebuffer
    pub async fn reset(&self) -> Result<()> {
        Ok(self.request(PipelineCommand::Reset).await?)
    }

    /// Set the volume (0-100); returns the applied value
    pub async fn set_volume(&self, volume: u8) -> Result<u8> {
        Ok(self
            .request(|reply| PipelineCommand::SetVolume(volume, reply))
            .await?)
    }

    pub async fn set_mute(&self, muted: bool) -> Result<()> {
        Ok(self
            .request(|reply| PipelineCommand::SetMute(muted, reply))
            .await?)
    }

    /// Ask the pipeline task to stop and exit
    pub async fn shutdown(&self) {
        let _ = self.commands.send(PipelineCommand::Shutdown).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.read().clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PipelineCommand,
    ) -> std::result::Result<T, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| PipelineError::NotReady)?;
        reply_rx.await.map_err(|_| PipelineError::NotReady)
    }
}

/// Spawn the control-plane task around an already-built producer and output.
///
/// Must be called from within a tokio runtime.
pub fn spawn(
    producer: StreamProducer,
    output: Box<dyn RenderOutput>,
    settings: Option<ConfigFile>,
) -> (PipelineHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (event_tx, _) = broadcast::channel(EVENT_QUEUE_CAPACITY);

    let status = Arc::new(RwLock::new(PipelineStatus {
        volume: producer.volume().volume(),
        muted: producer.volume().is_muted(),
        ..Default::default()
    }));

    let actor = PipelineActor {
        producer,
        output,
        settings,
        events: event_tx.clone(),
        status: status.clone(),
        last_rebuffer: None,
    };
    let task = tokio::spawn(actor.run(command_rx));

    let handle = PipelineHandle {
        commands: command_tx,
        events: event_tx,
        status,
    };
    (handle, task)
}

/// Build the full pipeline from configuration: buffer, cpal output, task.
///
/// Any failure leaves nothing behind; callers run on without audio.
pub fn launch(settings: ConfigFile) -> Result<(PipelineHandle, JoinHandle<()>)> {
    let config = &settings.config;
    config.validate()?;

    let policy = BufferPolicy::from_config(config);
    tracing::info!(
        "Audio buffer: {} slots, reference window {}, priming at {}",
        policy.capacity,
        policy.reference_window,
        policy.priming_threshold
    );

    let (producer, consumer) = stream_pair(policy, config.volume.level, config.ramp_samples())?;
    let playback = AudioPlayback::new(
        PlaybackConfig {
            device_id: config.audio.device_id.clone(),
            sample_rate: config.audio.sample_rate,
            render_quantum: config.audio.render_quantum,
        },
        consumer,
    )?;

    Ok(spawn(producer, Box::new(playback), Some(settings)))
}

struct PipelineActor {
    producer: StreamProducer,
    output: Box<dyn RenderOutput>,
    settings: Option<ConfigFile>,
    events: broadcast::Sender<PipelineEvent>,
    status: Arc<RwLock<PipelineStatus>>,
    last_rebuffer: Option<DateTime<Utc>>,
}

impl PipelineActor {
    async fn run(mut self, mut commands: mpsc::Receiver<PipelineCommand>) {
        let period = self.producer.policy().monitor_period;
        let mut monitor = time::interval_at(Instant::now() + period, period);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PipelineCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command, &mut monitor),
                },
                _ = monitor.tick(), if self.producer.is_running() => self.on_monitor_tick(),
            }
        }

        if self.producer.is_running() {
            self.stop();
        }
        tracing::debug!("Pipeline task finished");
    }

    fn handle(&mut self, command: PipelineCommand, monitor: &mut Interval) {
        match command {
            PipelineCommand::AudioData(samples) => {
                if self.producer.ingest(&samples) == IngestOutcome::Overrun {
                    self.emit(PipelineEvent::Overrun {
                        dropped: samples.len(),
                    });
                }
            }
            PipelineCommand::Start(reply) => {
                let result = self.start();
                if result.is_ok() {
                    // The monitor's lifetime follows start/stop
                    monitor.reset();
                }
                let _ = reply.send(result);
            }
            PipelineCommand::Stop(reply) => {
                self.stop();
                let _ = reply.send(());
            }
            PipelineCommand::Reset(reply) => {
                let level = self.producer.buffer_level();
                self.producer.rebuffer(RebufferReason::Manual);
                self.note_rebuffer(level, RebufferReason::Manual);
                let _ = reply.send(());
            }
            PipelineCommand::SetVolume(volume, reply) => {
                let volume = self.producer.set_volume(volume);
                self.persist_volume(volume);
                self.emit(PipelineEvent::Volume { volume });
                let _ = reply.send(volume);
            }
            PipelineCommand::SetMute(muted, reply) => {
                self.producer.set_mute(muted);
                self.emit(PipelineEvent::Mute { muted });
                let _ = reply.send(());
            }
            PipelineCommand::Shutdown => {}
        }
        self.refresh_status();
    }

    fn start(&mut self) -> std::result::Result<(), AudioError> {
        if self.producer.is_running() {
            return Ok(());
        }
        let output = &mut self.output;
        blocking(|| output.resume())?;
        self.producer.start();
        tracing::info!("Audio pipeline started");
        self.emit(PipelineEvent::Started);
        Ok(())
    }

    fn stop(&mut self) {
        self.producer.stop();
        let output = &mut self.output;
        if let Err(e) = blocking(|| output.suspend()) {
            tracing::warn!("Failed to suspend output: {}", e);
        }
        tracing::info!("Audio pipeline stopped");
        self.emit(PipelineEvent::Stopped);
    }

    fn on_monitor_tick(&mut self) {
        while let Some(e) = self.output.poll_error() {
            tracing::warn!("Output stream error: {}", e);
        }

        let report = self.producer.monitor_tick();

        if report.new_underruns > 0 {
            tracing::warn!(
                "Audio buffer underrun, {} periods of silence",
                report.new_underruns
            );
            self.emit(PipelineEvent::Underrun {
                count: report.new_underruns,
            });
        }

        self.emit(PipelineEvent::BufferLevel {
            level: report.level,
        });

        if let Some(reason) = report.rebuffer {
            self.note_rebuffer(report.level, reason);
        }

        self.refresh_status();
    }

    fn note_rebuffer(&mut self, level: f32, reason: RebufferReason) {
        self.last_rebuffer = Some(Utc::now());
        self.emit(PipelineEvent::Rebuffer { level, reason });
    }

    fn persist_volume(&mut self, volume: u8) {
        if let Some(settings) = self.settings.as_mut() {
            settings.config.volume.level = volume;
            if let Err(e) = blocking(|| settings.save()) {
                tracing::warn!("Failed to save volume to {}: {}", settings.path().display(), e);
            }
        }
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn refresh_status(&self) {
        let control = self.producer.control();
        let mut status = self.status.write();
        status.running = self.producer.is_running();
        status.volume = self.producer.volume().volume();
        status.muted = self.producer.volume().is_muted();
        status.buffer_level = self.producer.buffer_level();
        status.underruns = control.underruns();
        status.overruns = self.producer.overruns();
        status.rebuffers = self.producer.rebuffers();
        status.discarded_samples = self.producer.discarded();
        status.last_rebuffer = self.last_rebuffer;
    }
}

/// Run blocking work without holding up the other tasks on this worker
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
