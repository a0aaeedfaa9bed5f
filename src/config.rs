//! Emulator configuration.
//!
//! An [`ApuConfig`] is fixed for the lifetime of a [`crate::NesSound`]: the
//! resampling ratio and buffer horizon are derived from it once at
//! initialization. Reconfiguring means building a new instance.

use serde::{Deserialize, Serialize};

use crate::blip::MAX_RATIO;
use crate::{NesApuError, Result};

/// NTSC 2A03 CPU clock in Hz
pub const NTSC_CLOCK_RATE: u32 = 1_789_773;
/// PAL 2A07 CPU clock in Hz
pub const PAL_CLOCK_RATE: u32 = 1_662_607;
/// Default output sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Default maximum number of samples returned by one frame
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Console timing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// 60 Hz consoles
    #[default]
    Ntsc,
    /// 50 Hz consoles
    Pal,
}

impl Region {
    /// CPU clock rate for this region.
    pub fn clock_rate(self) -> u32 {
        match self {
            Region::Ntsc => NTSC_CLOCK_RATE,
            Region::Pal => PAL_CLOCK_RATE,
        }
    }

    /// Clocks per frame-sequencer step.
    pub fn frame_period(self) -> i64 {
        match self {
            Region::Ntsc => 7458,
            Region::Pal => 8314,
        }
    }

    /// Clocks per video frame, rounded down.
    pub fn frame_clocks(self) -> i64 {
        match self {
            Region::Ntsc => 29_780,
            Region::Pal => 33_247,
        }
    }
}

/// Configuration for an APU instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApuConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Emulated clock rate in Hz
    pub clock_rate: u32,

    /// Maximum number of samples handed out by one `run_frame`
    /// Below the samples produced per frame, the host must drain the rest
    /// with `read_samples` or the buffer eventually overflows
    pub output_block_size: usize,

    /// Length of the synthesizer buffer in milliseconds
    /// Bounds how long a single frame may be
    pub buffer_length_ms: u32,

    /// Master volume (1.0 = hardware mix levels)
    pub volume: f64,

    /// Frame-sequencer timing and DMC rate table
    pub region: Region,
}

impl ApuConfig {
    /// Configuration for an NTSC console at `sample_rate`.
    pub fn ntsc(sample_rate: u32) -> Self {
        ApuConfig {
            sample_rate,
            clock_rate: NTSC_CLOCK_RATE,
            output_block_size: DEFAULT_BLOCK_SIZE,
            buffer_length_ms: crate::blip::DEFAULT_LENGTH_MS,
            volume: 1.0,
            region: Region::Ntsc,
        }
    }

    /// Configuration for a PAL console at `sample_rate`.
    pub fn pal(sample_rate: u32) -> Self {
        ApuConfig {
            clock_rate: PAL_CLOCK_RATE,
            region: Region::Pal,
            ..Self::ntsc(sample_rate)
        }
    }

    /// Set the emulated clock rate.
    pub fn with_clock_rate(mut self, clock_rate: u32) -> Self {
        self.clock_rate = clock_rate;
        self
    }

    /// Set the maximum block returned per frame.
    pub fn with_output_block_size(mut self, size: usize) -> Self {
        self.output_block_size = size;
        self
    }

    /// Set the synthesizer buffer length.
    pub fn with_buffer_length_ms(mut self, length_ms: u32) -> Self {
        self.buffer_length_ms = length_ms;
        self
    }

    /// Set the master volume.
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    /// Samples produced by one video frame, rounded down.
    pub fn samples_per_frame(&self) -> usize {
        (u64::from(self.sample_rate) * self.region.frame_clocks() as u64
            / u64::from(self.clock_rate.max(1))) as usize
    }

    /// Check the configuration for values the emulator cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(NesApuError::ConfigError("sample_rate must be > 0".into()));
        }
        if self.clock_rate == 0 {
            return Err(NesApuError::ConfigError("clock_rate must be > 0".into()));
        }
        if self.clock_rate < self.sample_rate {
            return Err(NesApuError::ConfigError(format!(
                "clock_rate {} must not be below sample_rate {}",
                self.clock_rate, self.sample_rate
            )));
        }
        if self.output_block_size == 0 {
            return Err(NesApuError::ConfigError(
                "output_block_size must be > 0".into(),
            ));
        }
        if self.buffer_length_ms == 0 {
            return Err(NesApuError::ConfigError(
                "buffer_length_ms must be > 0".into(),
            ));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(NesApuError::ConfigError(format!(
                "volume {} must be a non-negative number",
                self.volume
            )));
        }
        if self.clock_rate / self.sample_rate > MAX_RATIO {
            return Err(NesApuError::ConfigError(format!(
                "clock_rate {} is more than {MAX_RATIO} times sample_rate {}",
                self.clock_rate, self.sample_rate
            )));
        }
        if self.output_block_size < self.samples_per_frame() {
            tracing::warn!(
                block = self.output_block_size,
                per_frame = self.samples_per_frame(),
                "output block is smaller than one frame; drain the rest with read_samples"
            );
        }
        Ok(())
    }

    /// Parse a configuration from JSON. Missing fields take NTSC defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ApuConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ApuConfig {
    fn default() -> Self {
        Self::ntsc(DEFAULT_SAMPLE_RATE)
    }
}
