//! 2A03 channel generators.
//!
//! Each generator is a small state machine clocked in CPU cycles. `run`
//! advances it across a time span and reports every change of its output
//! level to a [`Tap`] at the exact clock it happens, so the synthesizer can
//! place the edge between output samples.

mod dmc;
mod noise;
mod square;
mod triangle;

pub use dmc::{Dmc, DMC_STALL_CYCLES};
pub use noise::Noise;
pub use square::Square;
pub use triangle::Triangle;

use super::CpuTime;
use crate::blip::{BlipBuffer, BlipSynth};

/// Length counter load values, indexed by bits 3-7 of the fourth register.
pub const LENGTH_TABLE: [u8; 32] = [
    0x0A, 0xFE, 0x14, 0x02, 0x28, 0x04, 0x50, 0x06, 0xA0, 0x08, 0x3C, 0x0A, 0x0E, 0x0C, 0x1A,
    0x0E, 0x0C, 0x10, 0x18, 0x12, 0x30, 0x14, 0x60, 0x16, 0xC0, 0x18, 0x48, 0x1A, 0x10, 0x1C,
    0x20, 0x1E,
];

/// Destination for a channel's amplitude changes.
///
/// A tap without an output buffer swallows the changes; the channel keeps
/// running so its phase and counters stay exact while muted.
pub struct Tap<'a> {
    synth: &'a BlipSynth,
    output: Option<&'a mut BlipBuffer>,
}

impl<'a> Tap<'a> {
    /// Route changes through `synth` into `output`, or nowhere if `None`.
    pub fn new(synth: &'a BlipSynth, output: Option<&'a mut BlipBuffer>) -> Self {
        Self { synth, output }
    }

    /// Emit an amplitude change of `delta` units at `time`.
    #[inline]
    pub fn offset(&mut self, time: CpuTime, delta: i32) {
        if delta == 0 {
            return;
        }
        if let Some(output) = self.output.as_deref_mut() {
            if let Err(err) = self.synth.offset(time, delta, output) {
                tracing::warn!(%err, delta, "amplitude step dropped");
            }
        }
    }
}

/// Register file and timing state shared by every channel.
#[derive(Debug, Clone, Default)]
pub struct Oscillator {
    /// Last values written to the channel's four registers
    pub regs: [u8; 4],
    /// Set when a register was written since the channel last consumed it
    pub reg_written: [bool; 4],
    /// Remaining length (bytes for the DMC); 0 silences the channel
    pub length_counter: u32,
    /// Clocks from the end of the last run to the next timer event
    pub delay: CpuTime,
    /// Amplitude most recently reported to the tap
    pub last_amp: i32,
}

impl Oscillator {
    /// 11-bit timer period from the third and fourth registers.
    #[inline]
    pub fn period(&self) -> i64 {
        (i64::from(self.regs[3] & 7) << 8) | i64::from(self.regs[2])
    }

    /// Store a register write and mark it pending.
    pub fn write(&mut self, reg: usize, value: u8) {
        self.regs[reg] = value;
        self.reg_written[reg] = true;
    }

    /// Half-frame length counter clock; `halt_mask` selects the halt bit in the first register.
    pub fn clock_length(&mut self, halt_mask: u8) {
        if self.length_counter != 0 && self.regs[0] & halt_mask == 0 {
            self.length_counter -= 1;
        }
    }

    /// Record `amp` as the current level and return the change.
    #[inline]
    pub fn update_amp(&mut self, amp: i32) -> i32 {
        let delta = amp - self.last_amp;
        self.last_amp = amp;
        delta
    }

    fn reset(&mut self) {
        self.delay = 0;
        self.last_amp = 0;
    }
}

/// Decaying volume envelope used by the pulse and noise channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    level: i32,
    delay: i32,
}

impl Envelope {
    /// Quarter-frame clock. A pending write to the fourth register restarts the decay.
    pub fn clock(&mut self, osc: &mut Oscillator) {
        let period = i32::from(osc.regs[0] & 15);
        if osc.reg_written[3] {
            osc.reg_written[3] = false;
            self.delay = period;
            self.level = 15;
        } else {
            self.delay -= 1;
            if self.delay < 0 {
                self.delay = period;
                if self.level != 0 || osc.regs[0] & 0x20 != 0 {
                    self.level = (self.level - 1) & 15;
                }
            }
        }
    }

    /// Output volume: constant or decaying, and 0 once the length counter expires.
    pub fn volume(&self, osc: &Oscillator) -> i32 {
        if osc.length_counter == 0 {
            0
        } else if osc.regs[0] & 0x10 != 0 {
            i32::from(osc.regs[0] & 15)
        } else {
            self.level
        }
    }

    fn reset(&mut self) {
        self.level = 0;
        self.delay = 0;
    }
}

/// Common interface of the four tone generators.
///
/// The DMC shares the register layout but also needs host memory access while
/// running, so it exposes its own `run`.
pub trait Channel {
    /// Shared register and timing state.
    fn osc(&self) -> &Oscillator;

    /// Mutable shared register and timing state.
    fn osc_mut(&mut self) -> &mut Oscillator;

    /// Return to power-on state.
    fn reset(&mut self);

    /// Advance from `time` to `end_time`, reporting level changes to `tap`.
    fn run(&mut self, time: CpuTime, end_time: CpuTime, tap: &mut Tap<'_>);

    /// Apply a write to register `reg` (0-3) of this channel.
    fn write_register(&mut self, reg: usize, value: u8) {
        self.osc_mut().write(reg, value);
    }

    /// Current output level.
    fn level(&self) -> i32 {
        self.osc().last_amp
    }

    /// Whether the length counter is still running (the status bit).
    fn is_active(&self) -> bool {
        self.osc().length_counter != 0
    }
}
