//! Amplitude scaling for one channel's steps.

use super::{BlipBuffer, BlipTime};
use crate::Result;

/// Output units of a full-scale step at volume 1.0.
pub const FULL_SCALE: f64 = 32_768.0;

/// Converts a channel's level changes into buffer deltas.
///
/// A synth is bound to an amplitude range (15 for the tone channels, 127 for
/// the DMC). [`BlipSynth::volume`] sets the output level of a full-range step;
/// each level unit then maps to a fixed integer number of output units, so a
/// channel that returns to a level always returns to the same output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlipSynth {
    range: i32,
    unit: i32,
}

impl BlipSynth {
    /// Create a synth for amplitudes spanning `range` units, at zero volume.
    pub fn new(range: i32) -> Self {
        Self {
            range: range.abs().max(1),
            unit: 0,
        }
    }

    /// Set the output level of a full-range step (1.0 = full scale).
    pub fn volume(&mut self, volume: f64) {
        self.volume_unit(volume / f64::from(self.range));
    }

    /// Set the output level of a single amplitude unit (1.0 = full scale).
    pub fn volume_unit(&mut self, unit: f64) {
        self.unit = (unit * FULL_SCALE).round() as i32;
    }

    /// Output units per amplitude unit.
    pub fn unit(&self) -> i32 {
        self.unit
    }

    /// Amplitude range this synth was built for.
    pub fn range(&self) -> i32 {
        self.range
    }

    /// Add a step of `delta` amplitude units at `time`.
    ///
    /// Fails with [`crate::NesApuError::FrameOverflow`] when `time` is beyond
    /// the buffer's horizon; the step is then not recorded.
    #[inline]
    pub fn offset(&self, time: BlipTime, delta: i32, buffer: &mut BlipBuffer) -> Result<()> {
        buffer.add_delta(time, delta * self.unit)
    }
}
