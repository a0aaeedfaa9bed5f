//! Pulse channel
//!
//! Registers: `$4000/$4004` duty, halt and volume; `$4001/$4005` sweep;
//! `$4002/$4006` period low; `$4003/$4007` period high and length load.

use super::{Channel, Envelope, Oscillator, Tap};
use crate::apu::CpuTime;

const PHASE_RANGE: i32 = 8;
const NEGATE_FLAG: u8 = 0x08;
const SHIFT_MASK: u8 = 0x07;

/// One of the two pulse generators.
#[derive(Debug, Clone)]
pub struct Square {
    osc: Oscillator,
    env: Envelope,
    phase: i32,
    sweep_delay: i32,
    /// Added to the negated sweep offset: -1 on pulse 1 (ones' complement), 0 on pulse 2
    negative_adjust: i32,
}

impl Square {
    /// Pulse 1, whose sweep negates with ones' complement.
    pub fn pulse1() -> Self {
        Self::with_negative_adjust(-1)
    }

    /// Pulse 2, whose sweep negates with two's complement.
    pub fn pulse2() -> Self {
        Self::with_negative_adjust(0)
    }

    fn with_negative_adjust(negative_adjust: i32) -> Self {
        let mut square = Self {
            osc: Oscillator::default(),
            env: Envelope::default(),
            phase: 0,
            sweep_delay: 0,
            negative_adjust,
        };
        square.reset();
        square
    }

    /// Restart the duty sequence, as a write to the fourth register does.
    pub fn restart_phase(&mut self) {
        self.phase = PHASE_RANGE - 1;
    }

    /// Quarter-frame clock.
    pub fn clock_envelope(&mut self) {
        self.env.clock(&mut self.osc);
    }

    /// Half-frame sweep clock. Rewrites the period registers when the sweep fires.
    pub fn clock_sweep(&mut self) {
        let sweep = self.osc.regs[1];
        self.sweep_delay -= 1;
        if self.sweep_delay < 0 {
            self.osc.reg_written[1] = true;
            let mut period = self.osc.period() as i32;
            let shift = sweep & SHIFT_MASK;
            if shift != 0 && sweep & 0x80 != 0 && period >= 8 {
                let mut offset = period >> shift;
                if sweep & NEGATE_FLAG != 0 {
                    offset = self.negative_adjust - offset;
                }
                if period + offset < 0x800 {
                    period += offset;
                    self.osc.regs[2] = (period & 0xFF) as u8;
                    self.osc.regs[3] = (self.osc.regs[3] & !7) | ((period >> 8) & 7) as u8;
                }
            }
        }

        if self.osc.reg_written[1] {
            self.osc.reg_written[1] = false;
            self.sweep_delay = i32::from((sweep >> 4) & 7);
        }
    }

    /// Advance the duty position across `time..end_time` without output.
    fn maintain_phase(&mut self, time: CpuTime, end_time: CpuTime, timer_period: CpuTime) -> CpuTime {
        let remain = end_time - time;
        if remain > 0 {
            let count = (remain + timer_period - 1) / timer_period;
            self.phase = ((i64::from(self.phase) + count) & i64::from(PHASE_RANGE - 1)) as i32;
            time + count * timer_period
        } else {
            time
        }
    }
}

impl Channel for Square {
    fn osc(&self) -> &Oscillator {
        &self.osc
    }

    fn osc_mut(&mut self) -> &mut Oscillator {
        &mut self.osc
    }

    fn reset(&mut self) {
        self.sweep_delay = 0;
        self.phase = 0;
        self.env.reset();
        self.osc.reset();
    }

    fn run(&mut self, mut time: CpuTime, end_time: CpuTime, tap: &mut Tap<'_>) {
        let period = self.osc.period();
        let timer_period = (period + 1) * 2;

        let mut offset = period >> (self.osc.regs[1] & SHIFT_MASK);
        if self.osc.regs[1] & NEGATE_FLAG != 0 {
            offset = 0;
        }

        let volume = self.env.volume(&self.osc);
        if volume == 0 || period < 8 || period + offset >= 0x800 {
            if self.osc.last_amp != 0 {
                tap.offset(time, -self.osc.last_amp);
                self.osc.last_amp = 0;
            }
            time += self.osc.delay;
            time = self.maintain_phase(time, end_time, timer_period);
        } else {
            // Duty 3 is duty 1 inverted.
            let duty_select = (self.osc.regs[0] >> 6) & 3;
            let mut duty = 1 << duty_select;
            let mut amp = 0;
            if duty_select == 3 {
                duty = 2;
                amp = volume;
            }
            if self.phase < duty {
                amp ^= volume;
            }
            let delta = self.osc.update_amp(amp);
            tap.offset(time, delta);

            time += self.osc.delay;
            if time < end_time {
                let mut delta = amp * 2 - volume;
                let mut phase = self.phase;
                loop {
                    phase = (phase + 1) & (PHASE_RANGE - 1);
                    if phase == 0 || phase == duty {
                        delta = -delta;
                        tap.offset(time, delta);
                    }
                    time += timer_period;
                    if time >= end_time {
                        break;
                    }
                }
                self.osc.last_amp = (delta + volume) >> 1;
                self.phase = phase;
            }
        }
        self.osc.delay = time - end_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blip::BlipSynth;

    fn playing_square(period: u16, duty: u8) -> Square {
        let mut square = Square::pulse1();
        square.write_register(0, (duty << 6) | 0x30 | 15);
        square.write_register(2, (period & 0xFF) as u8);
        square.write_register(3, (period >> 8) as u8);
        square.osc.length_counter = 10;
        square.restart_phase();
        square
    }

    #[test]
    fn test_half_duty_levels() {
        let synth = BlipSynth::new(15);
        let mut tap = Tap::new(&synth, None);
        let mut square = playing_square(8, 2);
        let timer = 18;

        // Phase 7 -> 0 raises the output on the first timer clock.
        square.run(0, timer * 4, &mut tap);
        assert_eq!(square.level(), 15);
        square.run(timer * 4, timer * 4 + 1, &mut tap);
        assert_eq!(square.level(), 0, "falls at phase 4 for 50% duty");
        assert_eq!(square.osc.delay, timer - 1);
    }

    #[test]
    fn test_negated_quarter_duty_starts_high() {
        let synth = BlipSynth::new(15);
        let mut tap = Tap::new(&synth, None);
        let mut square = playing_square(8, 3);
        square.run(0, 1, &mut tap);
        assert_eq!(square.level(), 0, "duty 3 is low during phases 0-1");
        square.run(1, 18 * 2 + 1, &mut tap);
        assert_eq!(square.level(), 15);
    }

    #[test]
    fn test_short_period_is_silent_but_keeps_phase() {
        let synth = BlipSynth::new(15);
        let mut tap = Tap::new(&synth, None);
        let mut square = playing_square(7, 2);
        square.run(0, 16 * 3, &mut tap);
        assert_eq!(square.level(), 0);
        assert_eq!(square.phase, (7 + 3) & 7);
    }

    #[test]
    fn test_sweep_adds_shifted_period() {
        let mut square = playing_square(0x100, 2);
        square.write_register(1, 0x81);
        square.clock_sweep();
        assert_eq!(square.osc.period(), 0x180);
    }

    #[test]
    fn test_sweep_negate_differs_between_pulses() {
        let mut p1 = playing_square(0x100, 2);
        p1.write_register(1, 0x89);
        p1.clock_sweep();
        assert_eq!(p1.osc.period(), 0x7F);

        let mut p2 = Square::pulse2();
        p2.write_register(2, 0x00);
        p2.write_register(3, 0x01);
        p2.write_register(1, 0x89);
        p2.clock_sweep();
        assert_eq!(p2.osc.period(), 0x80);
    }

    #[test]
    fn test_sweep_overflow_mutes() {
        let synth = BlipSynth::new(15);
        let mut tap = Tap::new(&synth, None);
        let mut square = playing_square(0x700, 2);
        square.write_register(1, 0x01);
        square.run(0, 100_000, &mut tap);
        assert_eq!(square.level(), 0, "target period past 0x7FF silences");
    }
}
