//! Delta modulation channel
//!
//! Registers: `$4010` IRQ enable, loop and rate; `$4011` direct DAC load;
//! `$4012` sample address; `$4013` sample length.
//!
//! Sample bytes are fetched from CPU memory through the host's [`DmcReader`]
//! whenever the one-byte sample buffer empties. Each fetch steals CPU cycles;
//! they are accumulated here for the host's CPU model to collect.

use super::{Oscillator, Tap};
use crate::apu::CpuTime;
use crate::config::Region;
use crate::memory::DmcReader;

/// CPU cycles stolen by one DMC sample fetch.
pub const DMC_STALL_CYCLES: u32 = 4;

/// Output bit periods in CPU clocks, indexed by region and rate.
pub const DMC_PERIOD_TABLE: [[i64; 16]; 2] = [
    [
        0x1AC, 0x17C, 0x154, 0x140, 0x11E, 0x0FE, 0x0E2, 0x0D6, 0x0BE, 0x0A0, 0x08E, 0x080, 0x06A,
        0x054, 0x048, 0x036,
    ],
    [
        0x18E, 0x161, 0x13C, 0x129, 0x10A, 0x0EC, 0x0D2, 0x0C7, 0x0B1, 0x095, 0x084, 0x077, 0x062,
        0x04E, 0x043, 0x032,
    ],
];

/// Combined DAC response relative to the linear 7-bit value.
const DAC_TABLE: [u8; 128] = [
    0, 1, 2, 3, 4, 5, 6, 7, 7, 8, 9, 10, 11, 12, 13, 14, 15, 15, 16, 17, 18, 19, 20, 20, 21, 22,
    23, 24, 24, 25, 26, 27, 27, 28, 29, 30, 31, 31, 32, 33, 33, 34, 35, 36, 36, 37, 38, 38, 39, 40,
    41, 41, 42, 43, 43, 44, 45, 45, 46, 47, 47, 48, 48, 49, 50, 50, 51, 52, 52, 53, 53, 54, 55, 55,
    56, 56, 57, 58, 58, 59, 59, 60, 60, 61, 61, 62, 63, 63, 64, 64, 65, 65, 66, 66, 67, 67, 68, 68,
    69, 70, 70, 71, 71, 72, 72, 73, 73, 74, 74, 75, 75, 75, 76, 76, 77, 77, 78, 78, 79, 79, 80, 80,
    81, 81, 82, 82, 82, 83,
];

const LOOP_FLAG: u8 = 0x40;

/// The DMC generator.
#[derive(Debug, Clone)]
pub struct Dmc {
    osc: Oscillator,
    region: Region,
    period: i64,
    /// 15-bit offset into `$8000-$FFFF`
    address: u16,
    buf: u8,
    buf_full: bool,
    bits_remain: i32,
    bits: u32,
    silence: bool,
    dac: i32,
    enabled: bool,
    irq_enabled: bool,
    irq_flag: bool,
    next_irq: Option<CpuTime>,
    pending_stall: u32,
}

impl Dmc {
    /// DMC in power-on state using `region`'s rate table.
    pub fn new(region: Region) -> Self {
        let mut dmc = Self {
            osc: Oscillator::default(),
            region,
            period: 0,
            address: 0,
            buf: 0,
            buf_full: false,
            bits_remain: 1,
            bits: 0,
            silence: true,
            dac: 0,
            enabled: false,
            irq_enabled: false,
            irq_flag: false,
            next_irq: None,
            pending_stall: 0,
        };
        dmc.reset();
        dmc
    }

    /// Return to power-on state. Uncollected stall cycles are discarded.
    pub fn reset(&mut self) {
        self.address = 0;
        self.dac = 0;
        self.buf = 0;
        self.bits_remain = 1;
        self.bits = 0;
        self.buf_full = false;
        self.silence = true;
        self.enabled = false;
        self.next_irq = None;
        self.irq_flag = false;
        self.irq_enabled = false;
        self.pending_stall = 0;
        self.osc.reset();
        self.period = Self::rate_period(self.region, 0);
    }

    fn rate_period(region: Region, rate: u8) -> i64 {
        let table = match region {
            Region::Ntsc => &DMC_PERIOD_TABLE[0],
            Region::Pal => &DMC_PERIOD_TABLE[1],
        };
        table[usize::from(rate & 15)]
    }

    /// Apply a write to DMC register `reg` (0-3); `last_time` is the time the channel has run to.
    pub fn write_register(&mut self, reg: usize, value: u8, last_time: CpuTime) {
        self.osc.write(reg, value);
        match reg {
            0 => {
                self.period = Self::rate_period(self.region, value);
                // IRQ only fires for non-looping samples.
                self.irq_enabled = value & 0xC0 == 0x80;
                self.irq_flag &= self.irq_enabled;
                self.recalc_irq(last_time);
            }
            1 => {
                let old_dac = self.dac;
                self.dac = i32::from(value & 0x7F);
                // Make the pop from a direct load follow the non-linear DAC curve.
                let table_step = i32::from(DAC_TABLE[self.dac as usize])
                    - i32::from(DAC_TABLE[old_dac as usize]);
                self.osc.last_amp = self.dac - table_step;
            }
            _ => {}
        }
    }

    /// Force the DAC level and treat it as already output.
    pub(crate) fn set_dac(&mut self, dac: i32) {
        self.dac = dac & 0x7F;
        self.osc.last_amp = self.dac;
    }

    /// Enable or disable sample playback from `$4015`.
    ///
    /// Enabling an idle channel restarts the sample and fetches its first byte.
    pub fn set_enabled(&mut self, enabled: bool, reader: &mut dyn DmcReader, last_time: CpuTime) {
        let was_enabled = self.enabled;
        self.enabled = enabled;
        if !enabled {
            self.osc.length_counter = 0;
            self.next_irq = None;
        } else if !was_enabled {
            self.start(reader, last_time);
        }
    }

    fn reload_sample(&mut self) {
        self.address = 0x4000 + u16::from(self.osc.regs[2]) * 0x40;
        self.osc.length_counter = u32::from(self.osc.regs[3]) * 0x10 + 1;
    }

    fn start(&mut self, reader: &mut dyn DmcReader, last_time: CpuTime) {
        self.reload_sample();
        self.fill_buffer(reader);
        self.recalc_irq(last_time);
    }

    fn fill_buffer(&mut self, reader: &mut dyn DmcReader) {
        if self.buf_full || self.osc.length_counter == 0 {
            return;
        }
        let addr = 0x8000 | self.address;
        self.buf = reader.read_byte(addr);
        tracing::trace!(addr, value = self.buf, "DMC fetch");
        self.address = (self.address + 1) & 0x7FFF;
        self.buf_full = true;
        self.pending_stall += DMC_STALL_CYCLES;

        self.osc.length_counter -= 1;
        if self.osc.length_counter == 0 {
            if self.osc.regs[0] & LOOP_FLAG != 0 {
                self.reload_sample();
            } else {
                self.enabled = false;
                self.irq_flag = self.irq_enabled;
                self.next_irq = None;
            }
        }
    }

    fn recalc_irq(&mut self, last_time: CpuTime) {
        self.next_irq = if self.irq_enabled && self.osc.length_counter != 0 {
            let bits_left =
                (i64::from(self.osc.length_counter) - 1) * 8 + i64::from(self.bits_remain) - 1;
            Some(last_time + self.osc.delay + bits_left * self.period + 1)
        } else {
            None
        };
    }

    /// Time of the next sample fetch, if a sample is playing.
    pub fn next_read_time(&self, last_time: CpuTime) -> Option<CpuTime> {
        if self.osc.length_counter == 0 {
            return None;
        }
        Some(last_time + self.osc.delay + i64::from(self.bits_remain - 1) * self.period)
    }

    /// Number of fetches that will happen before `time`, and the earliest
    /// time at which that many have happened.
    pub fn count_reads(&self, time: CpuTime, last_time: CpuTime) -> (u32, CpuTime) {
        let Some(first_read) = self.next_read_time(last_time) else {
            return (0, time);
        };
        let avail = time - first_read;
        if avail <= 0 {
            return (0, time);
        }
        let byte_period = self.period * 8;
        let mut count = (avail - 1) / byte_period + 1;
        if self.osc.regs[0] & LOOP_FLAG == 0 {
            count = count.min(i64::from(self.osc.length_counter));
        }
        let last_read = first_read + (count - 1) * byte_period + 1;
        (count as u32, last_read)
    }

    /// Advance from `time` to `end_time`, fetching sample bytes through `reader`.
    pub fn run(
        &mut self,
        mut time: CpuTime,
        end_time: CpuTime,
        tap: &mut Tap<'_>,
        reader: &mut dyn DmcReader,
    ) {
        let delta = self.osc.update_amp(self.dac);
        tap.offset(time, delta);

        time += self.osc.delay;
        if time < end_time {
            let mut bits_remain = self.bits_remain;
            if self.silence && !self.buf_full {
                let count = (end_time - time + self.period - 1) / self.period;
                bits_remain = (bits_remain - 1 + 8 - (count % 8) as i32) % 8 + 1;
                time += count * self.period;
            } else {
                loop {
                    if !self.silence {
                        let step = (self.bits & 1) as i32 * 4 - 2;
                        self.bits >>= 1;
                        if (0..=0x7F).contains(&(self.dac + step)) {
                            self.dac += step;
                            tap.offset(time, step);
                        }
                    }
                    time += self.period;

                    bits_remain -= 1;
                    if bits_remain == 0 {
                        bits_remain = 8;
                        if self.buf_full {
                            self.silence = false;
                            self.bits = u32::from(self.buf);
                            self.buf_full = false;
                            self.fill_buffer(reader);
                        } else {
                            self.silence = true;
                        }
                    }
                    if time >= end_time {
                        break;
                    }
                }
                self.osc.last_amp = self.dac;
            }
            self.bits_remain = bits_remain;
        }
        self.osc.delay = time - end_time;
    }

    /// Shift the pending IRQ time into the next frame's origin.
    pub(crate) fn end_frame(&mut self, end_time: CpuTime) {
        if let Some(irq) = self.next_irq.as_mut() {
            *irq = (*irq - end_time).max(0);
        }
    }

    /// Shared register and timing state.
    pub fn osc(&self) -> &Oscillator {
        &self.osc
    }

    /// Current 7-bit DAC level.
    pub fn dac(&self) -> i32 {
        self.dac
    }

    /// Output level last reported to the tap.
    pub fn level(&self) -> i32 {
        self.osc.last_amp
    }

    /// Bytes left in the current sample (the status bit).
    pub fn is_active(&self) -> bool {
        self.osc.length_counter != 0
    }

    /// Whether playback is enabled through `$4015`.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sample-end interrupt flag.
    pub fn irq_flag(&self) -> bool {
        self.irq_flag
    }

    /// Clear the interrupt flag, as any `$4015` write does.
    pub fn clear_irq_flag(&mut self) {
        self.irq_flag = false;
    }

    /// Predicted time of the sample-end interrupt.
    pub fn next_irq(&self) -> Option<CpuTime> {
        self.next_irq
    }

    /// Collect and clear the CPU cycles stolen by fetches so far.
    pub fn take_stall_cycles(&mut self) -> u32 {
        std::mem::take(&mut self.pending_stall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blip::BlipSynth;

    struct Recorder {
        value: u8,
        reads: Vec<u16>,
    }

    impl DmcReader for Recorder {
        fn read_byte(&mut self, addr: u16) -> u8 {
            self.reads.push(addr);
            self.value
        }
    }

    fn recorder(value: u8) -> Recorder {
        Recorder {
            value,
            reads: Vec::new(),
        }
    }

    #[test]
    fn test_start_fetches_from_sample_address() {
        let mut dmc = Dmc::new(Region::Ntsc);
        let mut mem = recorder(0);
        dmc.write_register(2, 0x10, 0);
        dmc.write_register(3, 0x01, 0);
        dmc.set_enabled(true, &mut mem, 0);

        assert_eq!(mem.reads, vec![0xC400]);
        assert!(dmc.is_active());
        assert_eq!(dmc.osc().length_counter, 16);
        assert_eq!(dmc.take_stall_cycles(), DMC_STALL_CYCLES);
        assert_eq!(dmc.take_stall_cycles(), 0);
    }

    #[test]
    fn test_ones_ramp_the_dac_up() {
        let synth = BlipSynth::new(127);
        let mut tap = Tap::new(&synth, None);
        let mut dmc = Dmc::new(Region::Ntsc);
        let mut mem = recorder(0xFF);
        dmc.write_register(0, 0x0F, 0);
        dmc.set_enabled(true, &mut mem, 0);

        let period = DMC_PERIOD_TABLE[0][15];
        dmc.run(0, period * 9 + 1, &mut tap, &mut mem);
        assert_eq!(dmc.dac(), 16, "eight one-bits add 2 each");
        assert_eq!(mem.reads.len(), 1);
        assert!(!dmc.is_active());
        assert!(!dmc.is_enabled());
    }

    #[test]
    fn test_dac_clamps_at_bottom() {
        let synth = BlipSynth::new(127);
        let mut tap = Tap::new(&synth, None);
        let mut dmc = Dmc::new(Region::Ntsc);
        let mut mem = recorder(0x00);
        dmc.write_register(0, 0x0F, 0);
        dmc.write_register(1, 3, 0);
        dmc.set_enabled(true, &mut mem, 0);
        dmc.run(0, DMC_PERIOD_TABLE[0][15] * 9 + 1, &mut tap, &mut mem);
        assert_eq!(dmc.dac(), 1);
    }

    #[test]
    fn test_sample_end_raises_irq() {
        let mut dmc = Dmc::new(Region::Ntsc);
        let mut mem = recorder(0);
        dmc.write_register(0, 0x80, 0);
        dmc.set_enabled(true, &mut mem, 0);
        assert!(dmc.irq_flag(), "single-byte sample ends on its first fetch");

        dmc.write_register(0, 0x00, 0);
        assert!(!dmc.irq_flag(), "disabling IRQ clears the flag");
    }

    #[test]
    fn test_looping_sample_reloads() {
        let synth = BlipSynth::new(127);
        let mut tap = Tap::new(&synth, None);
        let mut dmc = Dmc::new(Region::Ntsc);
        let mut mem = recorder(0x55);
        dmc.write_register(0, 0x4F, 0);
        dmc.write_register(2, 0x00, 0);
        dmc.write_register(3, 0x00, 0);
        dmc.set_enabled(true, &mut mem, 0);
        dmc.run(0, DMC_PERIOD_TABLE[0][15] * 8 * 5, &mut tap, &mut mem);

        assert!(dmc.is_active());
        assert!(mem.reads.iter().all(|&addr| addr == 0xC000));
        assert!(mem.reads.len() >= 5);
    }

    #[test]
    fn test_count_reads_predicts_fetches() {
        let synth = BlipSynth::new(127);
        let mut tap = Tap::new(&synth, None);
        let mut dmc = Dmc::new(Region::Ntsc);
        let mut mem = recorder(0xAA);
        dmc.write_register(0, 0x0F, 0);
        dmc.write_register(3, 0x01, 0);
        dmc.set_enabled(true, &mut mem, 0);

        let end = 5_000;
        let (count, last_read) = dmc.count_reads(end, 0);
        assert!(last_read <= end);
        dmc.run(0, end, &mut tap, &mut mem);
        assert_eq!(mem.reads.len() as u32, 1 + count);
    }

    #[test]
    fn test_direct_load_pop_follows_table() {
        let mut dmc = Dmc::new(Region::Ntsc);
        dmc.write_register(1, 0x7F, 0);
        assert_eq!(dmc.dac(), 127);
        assert_eq!(dmc.level(), 127 - 83);
    }

    #[test]
    fn test_pal_rate_table() {
        let mut dmc = Dmc::new(Region::Pal);
        dmc.write_register(0, 0x0F, 0);
        assert_eq!(dmc.period, 0x032);
    }
}
