//! Output gain: volume/mute on the control side, smoothing on the render side

use super::control::SharedGain;

/// Maximum volume step
pub const MAX_VOLUME: u8 = 100;

/// Convert a 0-100 volume to a linear gain
pub fn volume_to_gain(volume: u8) -> f32 {
    volume.min(MAX_VOLUME) as f32 / MAX_VOLUME as f32
}

/// Control-plane volume state.
///
/// The volume survives a mute so unmuting restores it without a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeControl {
    volume: u8,
    muted: bool,
}

impl VolumeControl {
    pub fn new(volume: u8) -> Self {
        Self {
            volume: volume.min(MAX_VOLUME),
            muted: false,
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Gain the renderer should converge to
    pub fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            volume_to_gain(self.volume)
        }
    }

    /// Set the volume, ramping the output unless muted. Returns the clamped value.
    pub fn set_volume(&mut self, volume: u8, gain: &SharedGain) -> u8 {
        self.volume = volume.min(MAX_VOLUME);
        if !self.muted {
            gain.publish(volume_to_gain(self.volume), false);
        }
        self.volume
    }

    /// Mute or unmute immediately
    pub fn set_mute(&mut self, muted: bool, gain: &SharedGain) {
        self.muted = muted;
        gain.publish(self.effective_gain(), true);
    }
}

/// Render-side gain smoother.
///
/// Picks up new targets at period boundaries and moves towards them linearly,
/// one step per sample, over `ramp_samples`.
#[derive(Debug, Clone)]
pub struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    ramp_samples: u32,
    sequence: u32,
}

impl GainRamp {
    pub fn new(shared: &SharedGain, ramp_samples: u32) -> Self {
        let initial = shared.load();
        Self {
            current: initial.gain,
            target: initial.gain,
            step: 0.0,
            remaining: 0,
            ramp_samples,
            sequence: initial.sequence,
        }
    }

    /// Gain applied to the most recent sample
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    fn sync(&mut self, shared: &SharedGain) {
        let target = shared.load();
        if target.sequence == self.sequence {
            return;
        }
        self.sequence = target.sequence;
        self.target = target.gain;

        if target.immediate || self.ramp_samples == 0 {
            self.current = target.gain;
            self.remaining = 0;
            self.step = 0.0;
        } else {
            self.remaining = self.ramp_samples;
            self.step = (self.target - self.current) / self.ramp_samples as f32;
        }
    }

    /// Scale `samples` in place by the smoothed gain
    pub fn apply(&mut self, shared: &SharedGain, samples: &mut [f32]) {
        self.sync(shared);

        if self.remaining == 0 {
            if self.current != 1.0 {
                for sample in samples.iter_mut() {
                    *sample *= self.current;
                }
            }
            return;
        }

        for sample in samples.iter_mut() {
            if self.remaining > 0 {
                self.remaining -= 1;
                self.current = if self.remaining == 0 {
                    self.target
                } else {
                    self.current + self.step
                };
            }
            *sample *= self.current;
        }
    }
}
