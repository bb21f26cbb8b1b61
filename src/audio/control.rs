//! Shared control block between the control plane and the render callback
//!
//! Besides the ring buffer cursors this is the only state the two contexts
//! share. Everything here is a single atomic cell; the render side never
//! blocks on it.
//!
//! # Reset handshake
//!
//! ```text
//!  control plane                     render callback
//!  ─────────────                     ───────────────
//!  request_reset()  ── Requested ──▶  (next period boundary)
//!  stops writing                      ring.reset(), re-enter Priming
//!  ingest resumes   ◀──── Idle ─────  complete_reset(), generation += 1
//! ```
//!
//! While a reset is requested the producer never calls `write`, and the
//! consumer only acts on the request between two of its own `read`s, so the
//! cursor reset never overlaps a transfer on either side.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

const RESET_IDLE: u8 = 0;
const RESET_REQUESTED: u8 = 1;

/// State shared by a [`StreamProducer`](super::StreamProducer) and its
/// [`StreamConsumer`](super::StreamConsumer).
#[derive(Debug)]
pub struct StreamControl {
    reset_state: AtomicU8,
    generation: AtomicU64,
    underruns: AtomicU64,
    periods: AtomicU64,
    gain: SharedGain,
}

impl StreamControl {
    pub fn new(initial_gain: f32) -> Self {
        Self {
            reset_state: AtomicU8::new(RESET_IDLE),
            generation: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            periods: AtomicU64::new(0),
            gain: SharedGain::new(initial_gain),
        }
    }

    /// Ask the consumer to reset the ring and re-prime at its next period.
    pub fn request_reset(&self) {
        self.reset_state.store(RESET_REQUESTED, Ordering::SeqCst);
    }

    /// Whether a reset has been requested and not yet carried out
    pub fn reset_pending(&self) -> bool {
        self.reset_state.load(Ordering::SeqCst) == RESET_REQUESTED
    }

    /// Mark the requested reset as done. Called by whoever zeroed the cursors.
    pub fn complete_reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.reset_state.store(RESET_IDLE, Ordering::SeqCst);
    }

    /// Number of resets completed so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn record_period(&self) {
        self.periods.fetch_add(1, Ordering::Relaxed);
    }

    /// Render periods processed by the consumer
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }

    pub fn gain(&self) -> &SharedGain {
        &self.gain
    }
}

/// A gain change published by the control plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainTarget {
    pub gain: f32,
    /// Apply without ramping (mute / unmute)
    pub immediate: bool,
    /// Bumped on every publish so the renderer can spot new targets
    pub sequence: u32,
}

const GAIN_IMMEDIATE_BIT: u64 = 1 << 32;
const GAIN_SEQUENCE_SHIFT: u32 = 33;
const GAIN_SEQUENCE_MASK: u64 = (1 << 31) - 1;

/// Gain target packed into one atomic word: value bits, immediate flag and
/// sequence number always travel together.
#[derive(Debug)]
pub struct SharedGain(AtomicU64);

impl SharedGain {
    pub fn new(gain: f32) -> Self {
        Self(AtomicU64::new(pack(gain, true, 0)))
    }

    /// Publish a new target. Only the control plane calls this.
    pub fn publish(&self, gain: f32, immediate: bool) {
        let sequence = self.load().sequence.wrapping_add(1);
        self.0.store(pack(gain, immediate, sequence), Ordering::SeqCst);
    }

    pub fn load(&self) -> GainTarget {
        let word = self.0.load(Ordering::SeqCst);
        GainTarget {
            gain: f32::from_bits(word as u32),
            immediate: word & GAIN_IMMEDIATE_BIT != 0,
            sequence: ((word >> GAIN_SEQUENCE_SHIFT) & GAIN_SEQUENCE_MASK) as u32,
        }
    }
}

fn pack(gain: f32, immediate: bool, sequence: u32) -> u64 {
    let mut word = gain.to_bits() as u64;
    if immediate {
        word |= GAIN_IMMEDIATE_BIT;
    }
    word | ((sequence as u64 & GAIN_SEQUENCE_MASK) << GAIN_SEQUENCE_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_handshake_states() {
        let control = StreamControl::new(1.0);
        assert!(!control.reset_pending());

        control.request_reset();
        assert!(control.reset_pending());

        control.complete_reset();
        assert!(!control.reset_pending());
        assert_eq!(control.generation(), 1);
    }

    #[test]
    fn test_shared_gain_packing() {
        let gain = SharedGain::new(0.75);
        let initial = gain.load();
        assert_eq!(initial.gain, 0.75);
        assert!(initial.immediate);
        assert_eq!(initial.sequence, 0);

        gain.publish(0.3, false);
        let next = gain.load();
        assert_eq!(next.gain, 0.3);
        assert!(!next.immediate);
        assert_eq!(next.sequence, 1);
    }

    #[test]
    fn test_gain_sequence_wraps() {
        let gain = SharedGain(AtomicU64::new(pack(0.5, false, GAIN_SEQUENCE_MASK as u32)));
        gain.publish(0.0, true);
        let target = gain.load();
        assert_eq!(target.sequence, 0);
        assert_eq!(target.gain, 0.0);
        assert!(target.immediate);
    }
}
