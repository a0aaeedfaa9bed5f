//! Triangle channel
//!
//! Registers: `$4008` linear counter and halt; `$400A` period low;
//! `$400B` period high and length load.

use super::{Channel, Oscillator, Tap};
use crate::apu::CpuTime;

const PHASE_RANGE: i32 = 16;

/// The triangle generator: a 32-step sequence gated by both counters.
#[derive(Debug, Clone)]
pub struct Triangle {
    osc: Oscillator,
    /// Sequence position, 1..=32
    phase: i32,
    linear_counter: u32,
}

impl Triangle {
    /// Triangle channel in power-on state.
    pub fn new() -> Self {
        let mut triangle = Self {
            osc: Oscillator::default(),
            phase: 1,
            linear_counter: 0,
        };
        triangle.reset();
        triangle
    }

    /// Quarter-frame clock of the linear counter.
    pub fn clock_linear_counter(&mut self) {
        if self.osc.reg_written[3] {
            self.linear_counter = u32::from(self.osc.regs[0] & 0x7F);
        } else if self.linear_counter != 0 {
            self.linear_counter -= 1;
        }
        if self.osc.regs[0] & 0x80 == 0 {
            self.osc.reg_written[3] = false;
        }
    }

    /// Remaining linear counter.
    pub fn linear_counter(&self) -> u32 {
        self.linear_counter
    }

    /// Level for the current phase: 15 down to 0, then 0 up to 15.
    fn calc_amp(&self) -> i32 {
        let amp = PHASE_RANGE - self.phase;
        if amp < 0 {
            self.phase - (PHASE_RANGE + 1)
        } else {
            amp
        }
    }

    /// Set the level reported at reset so power-on produces no step.
    pub(crate) fn settle_level(&mut self) {
        self.osc.last_amp = self.calc_amp();
    }
}

impl Default for Triangle {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for Triangle {
    fn osc(&self) -> &Oscillator {
        &self.osc
    }

    fn osc_mut(&mut self) -> &mut Oscillator {
        &mut self.osc
    }

    fn reset(&mut self) {
        self.linear_counter = 0;
        self.phase = 1;
        self.osc.reset();
    }

    fn run(&mut self, mut time: CpuTime, end_time: CpuTime, tap: &mut Tap<'_>) {
        let timer_period = self.osc.period() + 1;

        let delta = self.osc.update_amp(self.calc_amp());
        tap.offset(time, delta);

        time += self.osc.delay;
        // Ultrasonic periods are held rather than played.
        if self.osc.length_counter == 0 || self.linear_counter == 0 || timer_period < 3 {
            time = end_time;
        } else if time < end_time {
            let mut phase = self.phase;
            let mut volume = 1;
            if phase > PHASE_RANGE {
                phase -= PHASE_RANGE;
                volume = -volume;
            }
            loop {
                phase -= 1;
                if phase == 0 {
                    phase = PHASE_RANGE;
                    volume = -volume;
                } else {
                    tap.offset(time, volume);
                }
                time += timer_period;
                if time >= end_time {
                    break;
                }
            }
            if volume < 0 {
                phase += PHASE_RANGE;
            }
            self.phase = phase;
            self.osc.last_amp = self.calc_amp();
        }
        self.osc.delay = time - end_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blip::BlipSynth;

    fn playing_triangle(period: u16) -> Triangle {
        let mut triangle = Triangle::new();
        triangle.write_register(0, 0x7F);
        triangle.write_register(2, (period & 0xFF) as u8);
        triangle.write_register(3, (period >> 8) as u8);
        triangle.osc.length_counter = 10;
        triangle.clock_linear_counter();
        triangle
    }

    #[test]
    fn test_power_on_level_is_fifteen() {
        let mut triangle = Triangle::new();
        triangle.settle_level();
        assert_eq!(triangle.level(), 15);
    }

    #[test]
    fn test_linear_counter_reload_and_count() {
        let mut triangle = playing_triangle(100);
        assert_eq!(triangle.linear_counter(), 0x7F);
        assert!(!triangle.osc.reg_written[3], "reload flag clears without control bit");
        triangle.clock_linear_counter();
        assert_eq!(triangle.linear_counter(), 0x7E);
    }

    #[test]
    fn test_control_bit_keeps_reloading() {
        let mut triangle = Triangle::new();
        triangle.write_register(0, 0x85);
        triangle.write_register(3, 0);
        triangle.clock_linear_counter();
        triangle.clock_linear_counter();
        assert_eq!(triangle.linear_counter(), 5);
    }

    #[test]
    fn test_full_cycle_returns_to_start() {
        let synth = BlipSynth::new(15);
        let mut tap = Tap::new(&synth, None);
        let mut triangle = playing_triangle(9);
        triangle.settle_level();

        triangle.run(0, 10 * 16, &mut tap);
        assert_eq!(triangle.level(), 0, "descends to the bottom");
        triangle.run(10 * 16, 10 * 32, &mut tap);
        assert_eq!(triangle.level(), 15, "climbs back to the top");
    }

    #[test]
    fn test_halted_when_linear_counter_expires() {
        let synth = BlipSynth::new(15);
        let mut tap = Tap::new(&synth, None);
        let mut triangle = Triangle::new();
        triangle.write_register(2, 9);
        triangle.osc.length_counter = 10;
        triangle.settle_level();
        triangle.run(0, 1000, &mut tap);
        assert_eq!(triangle.level(), 15, "holds its level while halted");
    }
}
