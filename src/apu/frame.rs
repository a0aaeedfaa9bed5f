//! Frame sequencer
//!
//! A divider over the CPU clock that produces the quarter-frame (envelope,
//! linear counter) and half-frame (length counter, sweep) clocks, plus the
//! frame interrupt in 4-step mode.
//!
//! Step timing in CPU clocks, with `P` the region's step period
//! (7458 NTSC, 8314 PAL):
//!
//! | step | clocks | 4-step (`$4017` bit 7 = 0) | 5-step (bit 7 = 1) |
//! |------|--------|-----------------------------|--------------------|
//! | 1    | P      | quarter                     | quarter            |
//! | 2    | P      | quarter + half              | quarter + half     |
//! | 3    | P      | quarter                     | quarter            |
//! | 0    | P / 2P | quarter + half + IRQ        | quarter + half     |
//!
//! The NTSC sequence is two clocks shorter after step 1 and the PAL one after
//! step 2, giving frames of 29830 / 37282 (NTSC) and 33254 / 41566 (PAL) clocks.

use super::CpuTime;
use crate::config::Region;

/// Clocks produced by one sequencer step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEvents {
    /// Clock envelopes and the triangle linear counter
    pub quarter: bool,
    /// Clock length counters and sweep units
    pub half: bool,
}

/// The 4/5-step frame sequencer.
#[derive(Debug, Clone)]
pub struct FrameSequencer {
    region: Region,
    period: CpuTime,
    /// Clocks until the next step fires
    delay: CpuTime,
    /// Index of the next step to fire
    step: u32,
    /// Last value written to `$4017`
    mode: u8,
    irq_flag: bool,
    next_irq: Option<CpuTime>,
}

impl FrameSequencer {
    /// Sequencer in power-on state.
    pub fn new(region: Region) -> Self {
        let mut sequencer = Self {
            region,
            period: region.frame_period(),
            delay: 1,
            step: 0,
            mode: 0,
            irq_flag: false,
            next_irq: None,
        };
        sequencer.reset();
        sequencer
    }

    /// Return to power-on state. The odd-clock phase starts at 1.
    pub fn reset(&mut self) {
        self.delay = 1;
        self.step = 0;
        self.mode = 0;
        self.irq_flag = false;
        self.next_irq = None;
    }

    /// Apply a `$4017` write at `time`.
    ///
    /// The divider keeps only its odd half-clock. In 4-step mode the first
    /// step fires one full period later and counts as step 1, so nothing is
    /// clocked by the write itself. In 5-step mode step 0 is due at once,
    /// which clocks the quarter and half frame on the write (or one clock
    /// later on an odd cycle). Bit 6 inhibits and clears the frame interrupt.
    pub fn write_mode(&mut self, time: CpuTime, data: u8) {
        self.mode = data;
        let irq_enabled = data & 0x40 == 0;
        self.irq_flag &= irq_enabled;
        self.next_irq = None;

        self.delay &= 1;
        self.step = 0;
        if data & 0x80 == 0 {
            self.step = 1;
            self.delay += self.period;
            if irq_enabled {
                // Steps 1-3 then step 0; the flag is visible one clock later.
                self.next_irq = Some(time + self.delay + self.period * 3 - 2 + 1);
            }
        }
    }

    /// Clocks from the last run time until the next step.
    #[inline]
    pub fn delay(&self) -> CpuTime {
        self.delay
    }

    /// Account for `clocks` elapsed without reaching a step.
    #[inline]
    pub fn advance(&mut self, clocks: CpuTime) {
        self.delay -= clocks;
    }

    /// Fire the due step at `time` and schedule the next one.
    pub fn step(&mut self, time: CpuTime) -> FrameEvents {
        let mut events = FrameEvents {
            quarter: true,
            half: false,
        };
        self.delay = self.period;

        let step = self.step;
        self.step += 1;
        match step {
            0 | 2 => {
                if step == 0 && self.mode & 0xC0 == 0 {
                    self.irq_flag = true;
                    self.next_irq = Some(time + self.period * 4 - 2 + 1);
                }
                events.half = true;
                if step == 2 && self.region == Region::Pal {
                    self.delay -= 2;
                }
            }
            1 => {
                if self.region == Region::Ntsc {
                    self.delay -= 2;
                }
            }
            _ => {
                self.step = 0;
                if self.mode & 0x80 != 0 {
                    self.delay += self.period - self.long_step_trim();
                }
            }
        }
        events
    }

    fn long_step_trim(&self) -> CpuTime {
        match self.region {
            Region::Ntsc => 6,
            Region::Pal => 2,
        }
    }

    /// Current frame interrupt flag.
    pub fn irq_flag(&self) -> bool {
        self.irq_flag
    }

    /// Clear the frame interrupt flag, as a `$4015` read does.
    pub fn clear_irq_flag(&mut self) {
        self.irq_flag = false;
    }

    /// Predicted time at which the next frame interrupt becomes visible.
    pub fn next_irq(&self) -> Option<CpuTime> {
        self.next_irq
    }

    /// Whether 5-step mode is selected.
    pub fn is_five_step(&self) -> bool {
        self.mode & 0x80 != 0
    }

    /// Shift the pending IRQ time into the next frame's origin.
    pub(crate) fn end_frame(&mut self, end_time: CpuTime) {
        if let Some(irq) = self.next_irq.as_mut() {
            *irq = (*irq - end_time).max(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run the sequencer from `start` and return the times of the steps fired before `end`.
    fn step_times(seq: &mut FrameSequencer, start: CpuTime, end: CpuTime) -> Vec<(CpuTime, FrameEvents)> {
        let mut fired = Vec::new();
        let mut now = start;
        loop {
            let next = now + seq.delay();
            if next >= end {
                seq.advance(end - now);
                break;
            }
            seq.advance(next - now);
            now = next;
            fired.push((now, seq.step(now)));
        }
        fired
    }

    #[test]
    fn test_four_step_frame_length() {
        let mut seq = FrameSequencer::new(Region::Ntsc);
        seq.write_mode(0, 0x00);
        let fired = step_times(&mut seq, 0, 70_000);
        let times: Vec<_> = fired.iter().map(|(t, _)| *t).collect();
        assert_eq!(&times[..5], &[7459, 14915, 22373, 29831, 37289]);
        assert_eq!(times[7] - times[3], 29_830);
    }

    #[test]
    fn test_four_step_events() {
        let mut seq = FrameSequencer::new(Region::Ntsc);
        seq.write_mode(0, 0x00);
        let fired = step_times(&mut seq, 0, 30_000);
        let halves: Vec<bool> = fired.iter().map(|(_, e)| e.half).collect();
        assert_eq!(halves, vec![false, true, false, true]);
        assert!(fired.iter().all(|(_, e)| e.quarter));
        assert!(seq.irq_flag());
    }

    #[test]
    fn test_irq_prediction_matches_flag() {
        let mut seq = FrameSequencer::new(Region::Ntsc);
        seq.write_mode(0, 0x00);
        let predicted = seq.next_irq().expect("4-step mode schedules an IRQ");
        step_times(&mut seq, 0, predicted - 1);
        assert!(!seq.irq_flag());
        step_times(&mut seq, predicted - 1, predicted);
        assert!(seq.irq_flag());
    }

    #[test]
    fn test_five_step_clocks_immediately() {
        let mut seq = FrameSequencer::new(Region::Ntsc);
        step_times(&mut seq, 0, 1);
        seq.write_mode(1, 0x80);
        assert_eq!(seq.delay(), 0, "even-cycle write leaves no odd half-clock");
        let fired = step_times(&mut seq, 1, 2);
        assert_eq!(
            fired,
            vec![(1, FrameEvents { quarter: true, half: true })]
        );
        assert!(seq.next_irq().is_none());
    }

    #[test]
    fn test_five_step_frame_length() {
        let mut seq = FrameSequencer::new(Region::Ntsc);
        seq.write_mode(0, 0xC0);
        let fired = step_times(&mut seq, 0, 100_000);
        let zero_steps: Vec<_> = fired
            .iter()
            .filter(|(_, e)| e.half)
            .map(|(t, _)| *t)
            .collect();
        // step 0 and step 2 alternate as the half-frame clocks
        assert_eq!(zero_steps[2] - zero_steps[0], 37_282);
        assert!(!seq.irq_flag());
    }

    #[test]
    fn test_inhibit_clears_flag() {
        let mut seq = FrameSequencer::new(Region::Ntsc);
        seq.write_mode(0, 0x00);
        step_times(&mut seq, 0, 30_000);
        assert!(seq.irq_flag());
        seq.write_mode(30_000, 0x40);
        assert!(!seq.irq_flag());
        assert!(seq.next_irq().is_none());
    }

    #[test]
    fn test_pal_frame_length() {
        let mut seq = FrameSequencer::new(Region::Pal);
        seq.write_mode(0, 0x00);
        let fired = step_times(&mut seq, 0, 80_000);
        assert_eq!(fired[7].0 - fired[3].0, 33_254);
    }
}
