//! Register log replay
//!
//! A `RegisterLog` is a recorded sequence of timed APU writes grouped into
//! frames, the way a host emulator would issue them. Logs round-trip through
//! JSON:
//!
//! ```json
//! { "frames": [ { "end_time": 29830,
//!                 "writes": [ { "time": 0, "addr": 16405, "value": 1 } ] } ] }
//! ```

use crate::apu::CpuTime;
use crate::config::Region;
use crate::system::NesSound;
use crate::{NesApuError, Result};
use serde::{Deserialize, Serialize};

/// One register write at a frame-relative clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterWrite {
    /// CPU clock within the frame
    pub time: u32,
    /// Register address (`$4000-$4017`)
    pub addr: u16,
    /// Value written
    pub value: u8,
}

impl RegisterWrite {
    /// Convenience constructor.
    pub fn new(time: u32, addr: u16, value: u8) -> Self {
        RegisterWrite { time, addr, value }
    }
}

/// The writes of one frame and the clock at which it ends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogFrame {
    /// Frame length in CPU clocks
    pub end_time: u32,
    /// Writes in non-decreasing time order
    #[serde(default)]
    pub writes: Vec<RegisterWrite>,
}

/// A replayable sequence of frames.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterLog {
    /// Frames in playback order
    pub frames: Vec<LogFrame>,
}

impl RegisterLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame.
    pub fn push_frame(&mut self, end_time: u32, writes: Vec<RegisterWrite>) {
        self.frames.push(LogFrame { end_time, writes });
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the log has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total length in CPU clocks.
    pub fn total_clocks(&self) -> u64 {
        self.frames.iter().map(|f| u64::from(f.end_time)).sum()
    }

    /// Check that every frame's writes are ordered and end by `end_time`.
    pub fn validate(&self) -> Result<()> {
        for (index, frame) in self.frames.iter().enumerate() {
            let mut last = 0;
            for write in &frame.writes {
                if write.time < last {
                    return Err(NesApuError::ParseError(format!(
                        "frame {index}: write at {} precedes {last}",
                        write.time
                    )));
                }
                if write.time > frame.end_time {
                    return Err(NesApuError::ParseError(format!(
                        "frame {index}: write at {} after frame end {}",
                        write.time, frame.end_time
                    )));
                }
                last = write.time;
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON log.
    pub fn from_json(text: &str) -> Result<Self> {
        let log: RegisterLog = serde_json::from_str(text)?;
        log.validate()?;
        Ok(log)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Replay every frame into `sound` and return the produced samples.
    pub fn play(&self, sound: &mut NesSound) -> Result<Vec<i16>> {
        let mut block = vec![0i16; sound.config().output_block_size];
        let mut pcm = Vec::with_capacity(
            (self.total_clocks() * u64::from(sound.config().sample_rate)
                / u64::from(sound.config().clock_rate)) as usize,
        );

        for frame in &self.frames {
            for write in &frame.writes {
                sound.write_register(CpuTime::from(write.time), write.addr, write.value)?;
            }
            let count = sound.run_frame(CpuTime::from(frame.end_time), &mut block)?;
            pcm.extend_from_slice(&block[..count]);
            // Drain whatever exceeded the block size.
            loop {
                let count = sound.read_samples(&mut block);
                if count == 0 {
                    break;
                }
                pcm.extend_from_slice(&block[..count]);
            }
        }
        tracing::debug!(frames = self.frames.len(), samples = pcm.len(), "register log played");
        Ok(pcm)
    }

    /// A short tune that uses every channel.
    ///
    /// The DMC part loops a sample from `$C000`; play it with
    /// [`demo_sample_byte`] as the memory reader.
    pub fn demo(region: Region) -> Self {
        const MELODY: [f64; 8] = [261.63, 329.63, 392.00, 523.25, 392.00, 329.63, 293.66, 246.94];
        const BASS: [f64; 2] = [65.41, 98.00];
        const FRAMES: usize = 120;
        const NOTE_FRAMES: usize = 15;

        let clock = f64::from(region.clock_rate());
        let frame_clocks = region.frame_clocks() as u32;
        let pulse_period = |freq: f64| (clock / (16.0 * freq) - 1.0).round() as u16;
        let triangle_period = |freq: f64| (clock / (32.0 * freq) - 1.0).round() as u16;

        let mut log = RegisterLog::new();
        for frame in 0..FRAMES {
            let mut writes = Vec::new();
            if frame == 0 {
                writes.extend([
                    RegisterWrite::new(0, 0x4000, 0xB8), // 50% duty, constant volume 8
                    RegisterWrite::new(0, 0x4004, 0x75), // 25% duty, constant volume 5
                    RegisterWrite::new(0, 0x4008, 0xFF),
                    RegisterWrite::new(0, 0x4010, 0x4E), // looping, rate 14
                    RegisterWrite::new(0, 0x4011, 0x20),
                    RegisterWrite::new(0, 0x4012, 0x00),
                    RegisterWrite::new(0, 0x4013, 0x03),
                    RegisterWrite::new(0, 0x400E, 0x03),
                    RegisterWrite::new(0, 0x4015, 0x1F),
                ]);
            }
            if frame % NOTE_FRAMES == 0 {
                let note = frame / NOTE_FRAMES;
                let lead = pulse_period(MELODY[note % MELODY.len()]);
                let harmony = pulse_period(MELODY[(note + 2) % MELODY.len()] * 0.5);
                let bass = triangle_period(BASS[(note / 2) % BASS.len()]);
                push_period(&mut writes, 100, 0x4002, lead);
                push_period(&mut writes, 140, 0x4006, harmony);
                push_period(&mut writes, 180, 0x400A, bass);
            }
            if frame % (NOTE_FRAMES * 2) == 0 {
                // Decaying noise hit
                writes.push(RegisterWrite::new(220, 0x400C, 0x04));
                writes.push(RegisterWrite::new(220, 0x400F, 0x08));
            }
            if frame == FRAMES - 1 {
                writes.push(RegisterWrite::new(frame_clocks / 2, 0x4015, 0x00));
            }
            log.push_frame(frame_clocks, writes);
        }
        log
    }
}

/// Low and high period writes; the high write also loads the length counter.
fn push_period(writes: &mut Vec<RegisterWrite>, time: u32, low_addr: u16, period: u16) {
    writes.push(RegisterWrite::new(time, low_addr, (period & 0xFF) as u8));
    writes.push(RegisterWrite::new(time, low_addr + 1, 0x08 | ((period >> 8) & 7) as u8));
}

/// Sample memory for [`RegisterLog::demo`]: alternating runs of rising and
/// falling delta bits, which the DMC turns into a triangle ramp.
pub fn demo_sample_byte(addr: u16) -> u8 {
    if (addr >> 2) & 1 == 0 {
        0xFF
    } else {
        0x00
    }
}
