//! Band-limited sample buffer.
//!
//! [`BlipBuffer`] receives amplitude steps at emulated clock times (through a
//! [`BlipSynth`]) and produces PCM samples at the configured output rate. The
//! band-limited step kernels, the fixed-point resampler and the DC-blocking
//! integrator come from the `blip_buf` crate; this module adds the frame
//! horizon checks the chip core relies on.
//!
//! Time handling follows the frame model used by the chip core: every
//! position is relative to the start of the current frame, and
//! [`BlipBuffer::end_frame`] moves the origin forward.

mod synth;

pub use synth::{BlipSynth, FULL_SCALE};

use blip_buf::BlipBuf;

use crate::{NesApuError, Result};

/// Clock time relative to the start of the current frame.
pub type BlipTime = i64;

/// Default buffer length in milliseconds.
pub const DEFAULT_LENGTH_MS: u32 = 250;

/// Largest clock/sample ratio `blip_buf` can resample.
pub const MAX_RATIO: u32 = 1 << 20;

/// Most samples one frame may produce before the resampler's fixed-point
/// time overflows.
pub const MAX_FRAME: u32 = 4000;

/// Resampling delta buffer with a bounded horizon.
pub struct BlipBuffer {
    blip: BlipBuf,
    size: u32,
    sample_rate: u32,
    clock_rate: u32,
    length_ms: u32,
}

impl BlipBuffer {
    /// Buffer holding `length_ms` milliseconds of `sample_rate` output for
    /// steps timed in `clock_rate` clocks.
    pub fn new(sample_rate: u32, clock_rate: u32, length_ms: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(NesApuError::ConfigError(
                "sample rate must be non-zero".into(),
            ));
        }
        if clock_rate == 0 {
            return Err(NesApuError::ConfigError("clock rate must be non-zero".into()));
        }
        if clock_rate < sample_rate || clock_rate / sample_rate > MAX_RATIO {
            return Err(NesApuError::ConfigError(format!(
                "clock rate {clock_rate} Hz cannot be resampled to {sample_rate} Hz"
            )));
        }
        let size = (u64::from(sample_rate) * (u64::from(length_ms) + 1)).div_ceil(1000);
        let size = u32::try_from(size).map_err(|_| {
            NesApuError::ConfigError(format!(
                "buffer of {length_ms} ms at {sample_rate} Hz is too large"
            ))
        })?;

        let mut blip = BlipBuf::new(size);
        blip.set_rates(f64::from(clock_rate), f64::from(sample_rate));
        Ok(Self {
            blip,
            size,
            sample_rate,
            clock_rate,
            length_ms,
        })
    }

    /// Discard all pending steps and unread samples.
    pub fn clear(&mut self) {
        self.blip.clear();
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clock rate in Hz.
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Buffer length in milliseconds.
    pub fn length_ms(&self) -> u32 {
        self.length_ms
    }

    /// Capacity in samples.
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Add an amplitude step of `delta` output units at `time`.
    ///
    /// Times outside `0..=frame_capacity()` are refused with
    /// [`NesApuError::FrameOverflow`] and leave the buffer untouched.
    pub fn add_delta(&mut self, time: BlipTime, delta: i32) -> Result<()> {
        let capacity = self.frame_capacity();
        if !(0..=capacity).contains(&time) {
            return Err(NesApuError::FrameOverflow { time, capacity });
        }
        self.blip.add_delta(time as u32, delta);
        Ok(())
    }

    /// End the current frame `time` clocks after its start.
    ///
    /// Samples up to that point become available for reading and the next
    /// frame's times are relative to `time`. Times past the horizon are
    /// clamped to it.
    pub fn end_frame(&mut self, time: BlipTime) {
        let time = time.clamp(0, self.frame_capacity());
        self.blip.end_frame(time as u32);
    }

    /// Number of samples ready to be read.
    pub fn samples_avail(&self) -> usize {
        self.blip.samples_avail() as usize
    }

    /// Number of clocks needed before `count` more samples are available.
    ///
    /// `count` is limited to what the buffer can still take in one frame.
    pub fn count_clocks(&self, count: usize) -> BlipTime {
        let count = u32::try_from(count).unwrap_or(u32::MAX).min(self.room());
        BlipTime::from(self.blip.clocks_needed(count))
    }

    /// Latest frame-relative time that still fits in the buffer.
    pub fn frame_capacity(&self) -> BlipTime {
        BlipTime::from(self.blip.clocks_needed(self.room()))
    }

    /// Read up to `out.len()` samples, returning how many were written.
    ///
    /// Reading never blocks and never fails: with fewer samples available
    /// the return value is simply smaller, and unread samples stay queued.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        if out.is_empty() {
            return 0;
        }
        self.blip.read_samples(out, false)
    }

    /// Drop `count` samples from the front of the buffer without keeping them.
    pub fn remove_samples(&mut self, count: usize) {
        let mut scratch = [0i16; 256];
        let mut left = count.min(self.samples_avail());
        while left > 0 {
            let n = left.min(scratch.len());
            left -= self.read_samples(&mut scratch[..n]);
        }
    }

    // Samples the current frame may still add.
    fn room(&self) -> u32 {
        (self.size - self.blip.samples_avail().min(self.size)).min(MAX_FRAME)
    }
}

impl std::fmt::Debug for BlipBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlipBuffer")
            .field("sample_rate", &self.sample_rate)
            .field("clock_rate", &self.clock_rate)
            .field("size", &self.size)
            .field("samples_avail", &self.samples_avail())
            .finish_non_exhaustive()
    }
}
