//! Noise channel
//!
//! Registers: `$400C` halt and volume; `$400E` mode and period index;
//! `$400F` length load.

use super::{Channel, Envelope, Oscillator, Tap};
use crate::apu::CpuTime;

/// Timer periods in CPU clocks, indexed by the low nibble of `$400E`.
pub const NOISE_PERIOD_TABLE: [i64; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const MODE_FLAG: u8 = 0x80;

/// The noise generator: a 15-bit LFSR with selectable feedback tap.
#[derive(Debug, Clone)]
pub struct Noise {
    osc: Oscillator,
    env: Envelope,
    lfsr: u32,
}

impl Noise {
    /// Noise channel in power-on state.
    pub fn new() -> Self {
        let mut noise = Self {
            osc: Oscillator::default(),
            env: Envelope::default(),
            lfsr: 1 << 14,
        };
        noise.reset();
        noise
    }

    /// Quarter-frame clock.
    pub fn clock_envelope(&mut self) {
        self.env.clock(&mut self.osc);
    }

    /// Current shift register contents.
    pub fn lfsr(&self) -> u32 {
        self.lfsr
    }

    #[inline]
    fn tap_bit(&self) -> u32 {
        if self.osc.regs[2] & MODE_FLAG != 0 {
            8
        } else {
            13
        }
    }

    #[inline]
    fn shift(lfsr: u32, tap: u32) -> u32 {
        let feedback = (lfsr << tap) ^ (lfsr << 14);
        (feedback & 0x4000) | (lfsr >> 1)
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for Noise {
    fn osc(&self) -> &Oscillator {
        &self.osc
    }

    fn osc_mut(&mut self) -> &mut Oscillator {
        &mut self.osc
    }

    fn reset(&mut self) {
        self.lfsr = 1 << 14;
        self.env.reset();
        self.osc.reset();
    }

    fn run(&mut self, mut time: CpuTime, end_time: CpuTime, tap: &mut Tap<'_>) {
        let period = NOISE_PERIOD_TABLE[usize::from(self.osc.regs[2] & 15)];
        let volume = self.env.volume(&self.osc);
        let amp = if self.lfsr & 1 != 0 { volume } else { 0 };
        let delta = self.osc.update_amp(amp);
        tap.offset(time, delta);

        time += self.osc.delay;
        if time < end_time {
            let tap_bit = self.tap_bit();
            if volume == 0 {
                // Silent: clock the register once per period so the sequence
                // stays where it would be if it had been audible.
                let count = (end_time - time + period - 1) / period;
                for _ in 0..count {
                    self.lfsr = Self::shift(self.lfsr, tap_bit);
                }
                time += count * period;
            } else {
                let mut lfsr = self.lfsr;
                let mut delta = amp * 2 - volume;
                loop {
                    // Output flips whenever bits 0 and 1 differ.
                    if (lfsr + 1) & 2 != 0 {
                        delta = -delta;
                        tap.offset(time, delta);
                    }
                    lfsr = Self::shift(lfsr, tap_bit);
                    time += period;
                    if time >= end_time {
                        break;
                    }
                }
                self.osc.last_amp = (delta + volume) >> 1;
                self.lfsr = lfsr;
            }
        }
        self.osc.delay = time - end_time;
    }
}
