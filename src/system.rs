//! Host adapter
//!
//! `NesSound` pairs one [`NesApu`] with the [`BlipBuffer`] it mixes into and
//! the host's DMC memory reader, and exposes the per-frame host operations:
//! register writes, status reads and `run_frame`.

use crate::apu::{CpuTime, NesApu};
use crate::blip::BlipBuffer;
use crate::config::ApuConfig;
use crate::memory::DmcReader;
use crate::Result;
use std::fmt;

/// An APU with its output buffer and memory reader.
pub struct NesSound {
    apu: NesApu,
    buffer: BlipBuffer,
    reader: Box<dyn DmcReader>,
    config: ApuConfig,
}

impl NesSound {
    /// Validate `config`, size the synthesizer from it and reset.
    ///
    /// `reader` answers every DMC sample fetch for the lifetime of the
    /// instance. Closures `FnMut(u16) -> u8` work directly.
    pub fn initialize(reader: impl DmcReader + 'static, config: ApuConfig) -> Result<Self> {
        config.validate()?;

        let buffer = BlipBuffer::new(
            config.sample_rate,
            config.clock_rate,
            config.buffer_length_ms,
        )?;

        let mut apu = NesApu::new(config.region);
        apu.set_volume(config.volume);

        let mut sound = NesSound {
            apu,
            buffer,
            reader: Box::new(reader),
            config,
        };
        sound.reset();
        tracing::debug!(
            sample_rate = config.sample_rate,
            clock_rate = config.clock_rate,
            block = config.output_block_size,
            region = ?config.region,
            "NES sound initialized"
        );
        Ok(sound)
    }

    /// Return the chip to power-on state and drop all buffered output.
    pub fn reset(&mut self) {
        self.apu.reset();
        self.buffer.clear();
    }

    /// Write `value` to `addr` at `time` clocks into the current frame.
    pub fn write_register(&mut self, time: CpuTime, addr: u16, value: u8) -> Result<()> {
        self.apu
            .write_register(time, addr, value, &mut self.buffer, self.reader.as_mut())
    }

    /// Read `$4015` at `time`. Clears the frame interrupt flag.
    pub fn read_status(&mut self, time: CpuTime) -> Result<u8> {
        let status = self
            .apu
            .read_status(time, &mut self.buffer, self.reader.as_mut())?;
        Ok(status.bits())
    }

    /// End the frame at `end_time` and copy up to `output_block_size`
    /// samples into `out`, returning how many were copied.
    ///
    /// Samples that do not fit stay queued and come out first on the next call.
    /// When `output_block_size` is below the samples one frame produces, the
    /// queue grows every frame until it is drained with
    /// [`NesSound::read_samples`]; once it reaches the buffer length, frames
    /// fail with [`crate::NesApuError::FrameOverflow`].
    pub fn run_frame(&mut self, end_time: CpuTime, out: &mut [i16]) -> Result<usize> {
        self.apu
            .end_frame(end_time, &mut self.buffer, self.reader.as_mut())?;
        self.buffer.end_frame(end_time);

        let limit = out.len().min(self.config.output_block_size);
        Ok(self.buffer.read_samples(&mut out[..limit]))
    }

    /// Copy queued samples without ending a frame.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        self.buffer.read_samples(out)
    }

    /// Samples queued for reading.
    pub fn samples_avail(&self) -> usize {
        self.buffer.samples_avail()
    }

    /// Collect and clear the CPU cycles stolen by DMC fetches.
    pub fn take_dmc_stall_cycles(&mut self) -> u32 {
        self.apu.take_dmc_stall_cycles()
    }

    /// Mute or unmute channel `index` (0-4).
    pub fn set_channel_muted(&mut self, index: usize, muted: bool) -> Result<()> {
        self.apu.set_channel_muted(index, muted, &mut self.buffer)
    }

    /// Configuration this instance was built with.
    pub fn config(&self) -> &ApuConfig {
        &self.config
    }

    /// The chip engine.
    pub fn apu(&self) -> &NesApu {
        &self.apu
    }

    /// Mutable chip engine, for IRQ notifiers and look-ahead queries.
    pub fn apu_mut(&mut self) -> &mut NesApu {
        &mut self.apu
    }

    /// The output buffer.
    pub fn buffer(&self) -> &BlipBuffer {
        &self.buffer
    }
}

impl fmt::Debug for NesSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NesSound")
            .field("apu", &self.apu)
            .field("buffer", &self.buffer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::OpenBus;
    use crate::NesApuError;

    #[test]
    fn test_initialize_rejects_bad_config() {
        let config = ApuConfig::ntsc(0);
        let err = NesSound::initialize(OpenBus(0), config).unwrap_err();
        assert!(matches!(err, NesApuError::ConfigError(_)));
    }

    #[test]
    fn test_block_size_limits_run_frame() {
        let config = ApuConfig::ntsc(44_100).with_output_block_size(256);
        let mut sound = NesSound::initialize(OpenBus(0), config).unwrap();
        let mut pcm = vec![0i16; 4096];

        let count = sound.run_frame(29_830, &mut pcm).unwrap();
        assert_eq!(count, 256);
        assert!(sound.samples_avail() > 400, "remainder stays queued");
    }

    #[test]
    fn test_small_block_needs_draining() {
        let config = ApuConfig::ntsc(44_100).with_output_block_size(256);
        let mut pcm = vec![0i16; 4096];

        let mut drained = NesSound::initialize(OpenBus(0), config).unwrap();
        for _ in 0..40 {
            drained.run_frame(29_830, &mut pcm).unwrap();
            while drained.read_samples(&mut pcm) > 0 {}
        }

        let mut undrained = NesSound::initialize(OpenBus(0), config).unwrap();
        let overflow = (0..40).find_map(|_| undrained.run_frame(29_830, &mut pcm).err());
        assert!(
            matches!(overflow, Some(NesApuError::FrameOverflow { .. })),
            "queue should hit the horizon, got {overflow:?}"
        );
    }

    #[test]
    fn test_reset_drops_queued_samples() {
        let mut sound = NesSound::initialize(OpenBus(0), ApuConfig::default()).unwrap();
        let mut pcm = vec![0i16; 16];
        sound.run_frame(29_830, &mut pcm).unwrap();
        assert!(sound.samples_avail() > 0);
        sound.reset();
        assert_eq!(sound.samples_avail(), 0);
    }

    #[test]
    fn test_closure_reader() {
        let mut sound = NesSound::initialize(|addr: u16| (addr & 0xFF) as u8, ApuConfig::default()).unwrap();
        sound.write_register(0, 0x4012, 0x01).unwrap();
        sound.write_register(0, 0x4013, 0x01).unwrap();
        sound.write_register(0, 0x4015, 0x10).unwrap();
        assert_eq!(sound.take_dmc_stall_cycles(), 4);
        assert_eq!(sound.read_status(10).unwrap() & 0x10, 0x10);
    }
}
