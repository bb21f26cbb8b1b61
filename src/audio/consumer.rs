//! Render-side stream consumer
//!
//! Runs once per render period inside the real-time callback. It owns the
//! read half of the ring buffer and nothing else that is shared besides the
//! [`StreamControl`] block. Never allocates, locks, logs or blocks.

use std::sync::Arc;

use super::buffer::RingReader;
use super::control::StreamControl;
use super::gain::GainRamp;

/// Consumer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Withholding output until enough audio has accumulated
    Priming,
    /// Draining one render period per callback
    Streaming,
}

/// What a single render period produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Still priming, output is silence
    Priming,
    /// Real samples were rendered
    Played,
    /// Streaming but not enough data; output is silence
    Underrun,
}

/// Read side of the stream, owned by the render context
pub struct StreamConsumer {
    reader: RingReader,
    control: Arc<StreamControl>,
    priming_threshold: usize,
    state: ConsumerState,
    gain: GainRamp,
}

impl StreamConsumer {
    pub fn new(
        reader: RingReader,
        control: Arc<StreamControl>,
        priming_threshold: usize,
        ramp_samples: u32,
    ) -> Self {
        let gain = GainRamp::new(control.gain(), ramp_samples);
        Self {
            reader,
            control,
            priming_threshold,
            state: ConsumerState::Priming,
            gain,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Samples that must be buffered before streaming starts
    pub fn priming_threshold(&self) -> usize {
        self.priming_threshold
    }

    /// Render one period into `out`.
    ///
    /// `out` is fully overwritten: with buffered samples when streaming,
    /// otherwise with silence.
    pub fn render(&mut self, out: &mut [f32]) -> RenderOutcome {
        self.control.record_period();

        // Act on a pending reset at the period boundary, before touching
        // the cursors. The producer does not write while it is pending.
        if self.control.reset_pending() {
            self.reader.ring().reset();
            self.state = ConsumerState::Priming;
            self.control.complete_reset();
        }

        if self.state == ConsumerState::Priming {
            if self.reader.read_available() < self.priming_threshold {
                out.fill(0.0);
                self.gain.apply(self.control.gain(), out);
                return RenderOutcome::Priming;
            }
            self.state = ConsumerState::Streaming;
        }

        let outcome = if self.reader.read(out) {
            RenderOutcome::Played
        } else {
            out.fill(0.0);
            self.control.record_underrun();
            RenderOutcome::Underrun
        };

        self.gain.apply(self.control.gain(), out);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::ring_buffer;

    fn consumer_with(capacity: usize, threshold: usize) -> (crate::audio::buffer::RingWriter, StreamConsumer, Arc<StreamControl>) {
        let (writer, reader) = ring_buffer(capacity).unwrap();
        let control = Arc::new(StreamControl::new(1.0));
        let consumer = StreamConsumer::new(reader, control.clone(), threshold, 0);
        (writer, consumer, control)
    }

    #[test]
    fn test_priming_emits_silence() {
        let (mut writer, mut consumer, _control) = consumer_with(64, 10);
        assert!(writer.write(&[0.5; 9]));

        let mut out = [1.0; 4];
        assert_eq!(consumer.render(&mut out), RenderOutcome::Priming);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(consumer.state(), ConsumerState::Priming);
        assert_eq!(writer.read_available(), 9);
    }

    #[test]
    fn test_underrun_stays_streaming() {
        let (mut writer, mut consumer, control) = consumer_with(64, 4);
        assert!(writer.write(&[0.5; 6]));

        let mut out = [0.0; 4];
        assert_eq!(consumer.render(&mut out), RenderOutcome::Played);
        assert_eq!(out, [0.5; 4]);

        let mut out = [1.0; 4];
        assert_eq!(consumer.render(&mut out), RenderOutcome::Underrun);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(consumer.state(), ConsumerState::Streaming);
        assert_eq!(control.underruns(), 1);
        assert_eq!(control.periods(), 2);
    }

    #[test]
    fn test_reset_request_reprimes() {
        let (mut writer, mut consumer, control) = consumer_with(64, 4);
        assert!(writer.write(&[0.5; 20]));

        let mut out = [0.0; 4];
        assert_eq!(consumer.render(&mut out), RenderOutcome::Played);

        control.request_reset();
        assert_eq!(consumer.render(&mut out), RenderOutcome::Priming);
        assert_eq!(consumer.state(), ConsumerState::Priming);
        assert_eq!(writer.ring().cursors(), (0, 0));
        assert!(!control.reset_pending());
        assert_eq!(control.generation(), 1);
    }
}
