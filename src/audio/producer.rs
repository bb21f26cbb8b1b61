//! Control-plane stream producer and the rebuffering policy
//!
//! The producer owns the write half of the ring buffer. It accepts samples
//! from the network, samples the fill level on every monitor tick and forces
//! a rebuffer when the level drifts outside the safe band. Rather than
//! compensating clock drift, a rebuffer restarts from empty: a short audible
//! gap in exchange for a hard bound on latency.

use std::sync::Arc;
use std::time::Duration;

use super::buffer::RingWriter;
use super::control::StreamControl;
use super::gain::VolumeControl;
use crate::config::AppConfig;

/// Fill-level thresholds and the slot counts derived from them
#[derive(Debug, Clone, PartialEq)]
pub struct BufferPolicy {
    /// Ring buffer slots
    pub capacity: usize,
    /// Occupied slots that correspond to a level of 1.0
    pub reference_window: usize,
    /// Occupied slots the consumer waits for before streaming
    pub priming_threshold: usize,
    /// Rebuffer when the level falls below this
    pub underrun_level: f32,
    /// Rebuffer when the level rises above this
    pub overrun_level: f32,
    pub monitor_period: Duration,
}

impl BufferPolicy {
    /// Derive the policy from configuration: capacity is sample rate times
    /// the buffered seconds, the reference window a fraction of that.
    pub fn from_config(config: &AppConfig) -> Self {
        let buffer = &config.buffer;
        let capacity = (config.audio.sample_rate as f64 * buffer.capacity_seconds as f64).round() as usize;
        let reference_window = ((capacity as f64 * buffer.reference_fraction as f64).round() as usize).max(1);
        let priming_threshold = (reference_window as f64 * buffer.priming_level as f64).round() as usize;

        Self {
            capacity,
            reference_window,
            priming_threshold,
            underrun_level: buffer.underrun_level,
            overrun_level: buffer.overrun_level,
            monitor_period: Duration::from_millis(buffer.monitor_period_ms),
        }
    }

    /// Normalize an occupied-slot count against the reference window
    pub fn level(&self, occupied: usize) -> f32 {
        occupied as f32 / self.reference_window as f32
    }

    /// Classify a level against the safe band
    pub fn check(&self, level: f32) -> Option<RebufferReason> {
        if level < self.underrun_level {
            Some(RebufferReason::Underrun)
        } else if level > self.overrun_level {
            Some(RebufferReason::Overrun)
        } else {
            None
        }
    }
}

/// Why a rebuffer was forced
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebufferReason {
    /// Buffer nearly drained
    Underrun,
    /// Buffer holding too much latency
    Overrun,
    /// Requested explicitly
    Manual,
}

/// Result of handing a span to [`StreamProducer::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// Pipeline not running; span ignored
    NotRunning,
    /// A rebuffer is in progress; span dropped
    Rebuffering,
    /// Not enough space; span dropped
    Overrun,
}

/// What one monitor tick observed and did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorReport {
    pub level: f32,
    pub rebuffer: Option<RebufferReason>,
    /// Consumer underruns since the previous tick
    pub new_underruns: u64,
}

/// Write side of the stream, owned by the control plane
pub struct StreamProducer {
    writer: RingWriter,
    control: Arc<StreamControl>,
    policy: BufferPolicy,
    volume: VolumeControl,
    running: bool,
    overruns: u64,
    rebuffers: u64,
    discarded: u64,
    seen_underruns: u64,
}

impl StreamProducer {
    pub fn new(
        writer: RingWriter,
        control: Arc<StreamControl>,
        policy: BufferPolicy,
        volume: VolumeControl,
    ) -> Self {
        Self {
            writer,
            control,
            policy,
            volume,
            running: false,
            overruns: 0,
            rebuffers: 0,
            discarded: 0,
            seen_underruns: 0,
        }
    }

    pub fn policy(&self) -> &BufferPolicy {
        &self.policy
    }

    pub fn control(&self) -> &Arc<StreamControl> {
        &self.control
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Occupied slots as seen right now
    pub fn read_available(&self) -> usize {
        self.writer.read_available()
    }

    /// Current fill level (1.0 = one reference window buffered)
    pub fn buffer_level(&self) -> f32 {
        self.policy.level(self.writer.read_available())
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Samples dropped because a reset was still outstanding
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn rebuffers(&self) -> u64 {
        self.rebuffers
    }

    pub fn volume(&self) -> &VolumeControl {
        &self.volume
    }

    /// Queue freshly arrived samples for playback. Never blocks.
    pub fn ingest(&mut self, samples: &[f32]) -> IngestOutcome {
        if !self.running {
            return IngestOutcome::NotRunning;
        }

        if self.reset_in_progress() {
            self.discarded += samples.len() as u64;
            tracing::debug!(
                "Reset pending (generation {}), discarding {} samples",
                self.control.generation(),
                samples.len()
            );
            return IngestOutcome::Rebuffering;
        }

        if !self.writer.write(samples) {
            self.overruns += 1;
            tracing::warn!(
                "Audio buffer overrun, dropping {} samples ({} free)",
                samples.len(),
                self.writer.write_available()
            );
            return IngestOutcome::Overrun;
        }

        IngestOutcome::Accepted
    }

    /// Periodic fill-level check; rebuffers on a threshold breach while running.
    pub fn monitor_tick(&mut self) -> MonitorReport {
        let level = self.buffer_level();

        let underruns = self.control.underruns();
        let new_underruns = underruns.saturating_sub(self.seen_underruns);
        self.seen_underruns = underruns;

        let mut rebuffer = None;
        if self.running && !self.reset_in_progress() {
            if let Some(reason) = self.policy.check(level) {
                tracing::debug!("Buffer level {:.2} out of range ({:?}), rebuffering", level, reason);
                self.rebuffer(reason);
                rebuffer = Some(reason);
            }
        }

        MonitorReport {
            level,
            rebuffer,
            new_underruns,
        }
    }

    /// Force a rebuffer: both cursors return to zero and the consumer
    /// re-enters priming at its next period.
    pub fn rebuffer(&mut self, reason: RebufferReason) {
        self.rebuffers += 1;
        self.control.request_reset();
        self.complete_detached_reset();
        tracing::info!("Rebuffering ({:?}), generation {}", reason, self.control.generation());
    }

    /// Begin accepting samples
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop accepting samples and discard everything buffered
    pub fn stop(&mut self) {
        self.running = false;
        self.control.request_reset();
        self.complete_detached_reset();
    }

    /// Set the volume (0-100). Returns the clamped value.
    pub fn set_volume(&mut self, volume: u8) -> u8 {
        self.volume.set_volume(volume, self.control.gain())
    }

    pub fn set_mute(&mut self, muted: bool) {
        self.volume.set_mute(muted, self.control.gain());
    }

    fn reset_in_progress(&mut self) -> bool {
        self.complete_detached_reset();
        self.control.reset_pending()
    }

    /// Without a consumer nobody can be mid-read, so reset directly.
    fn complete_detached_reset(&mut self) {
        if self.control.reset_pending() && self.writer.is_detached() {
            self.writer.ring().reset();
            self.control.complete_reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::ring_buffer;

    fn policy(capacity: usize, reference_window: usize) -> BufferPolicy {
        BufferPolicy {
            capacity,
            reference_window,
            priming_threshold: reference_window / 2,
            underrun_level: 0.25,
            overrun_level: 1.75,
            monitor_period: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_policy_from_default_config() {
        let policy = BufferPolicy::from_config(&AppConfig::default());
        assert_eq!(policy.capacity, 24_000);
        assert_eq!(policy.reference_window, 12_000);
        assert_eq!(policy.priming_threshold, 6_000);
        assert_eq!(policy.monitor_period, Duration::from_secs(1));
    }

    #[test]
    fn test_policy_band() {
        let policy = policy(200, 100);
        assert_eq!(policy.check(0.2), Some(RebufferReason::Underrun));
        assert_eq!(policy.check(1.8), Some(RebufferReason::Overrun));
        assert_eq!(policy.check(1.0), None);
        assert_eq!(policy.check(0.25), None);
        assert_eq!(policy.check(1.75), None);
    }

    #[test]
    fn test_ingest_requires_running() {
        let (writer, _reader) = ring_buffer(200).unwrap();
        let control = Arc::new(StreamControl::new(1.0));
        let mut producer = StreamProducer::new(writer, control, policy(200, 100), VolumeControl::new(75));

        assert_eq!(producer.ingest(&[0.1; 10]), IngestOutcome::NotRunning);
        assert_eq!(producer.read_available(), 0);

        producer.start();
        assert_eq!(producer.ingest(&[0.1; 10]), IngestOutcome::Accepted);
        assert_eq!(producer.read_available(), 10);
    }

    #[test]
    fn test_overrun_drops_span() {
        let (writer, _reader) = ring_buffer(16).unwrap();
        let control = Arc::new(StreamControl::new(1.0));
        let mut producer = StreamProducer::new(writer, control, policy(16, 8), VolumeControl::new(75));
        producer.start();

        assert_eq!(producer.ingest(&[0.1; 12]), IngestOutcome::Accepted);
        assert_eq!(producer.ingest(&[0.1; 4]), IngestOutcome::Overrun);
        assert_eq!(producer.read_available(), 12);
        assert_eq!(producer.overruns(), 1);
    }

    #[test]
    fn test_detached_stop_resets_immediately() {
        let (writer, reader) = ring_buffer(64).unwrap();
        let control = Arc::new(StreamControl::new(1.0));
        let mut producer = StreamProducer::new(writer, control.clone(), policy(64, 32), VolumeControl::new(75));
        producer.start();
        assert_eq!(producer.ingest(&[0.1; 20]), IngestOutcome::Accepted);

        drop(reader);
        producer.stop();
        assert_eq!(producer.read_available(), 0);
        assert!(!control.reset_pending());
    }
}
