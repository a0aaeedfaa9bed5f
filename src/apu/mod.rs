//! 2A03 register/event engine
//!
//! `NesApu` owns the five channel generators and the frame sequencer. Every
//! operation carries the CPU clock at which it happens, counted from the start
//! of the current frame. Before a write is applied the engine runs every
//! channel up to that clock, firing the sequencer steps it crosses in order,
//! and pushes each level change into the caller's [`BlipBuffer`].

pub mod channels;
pub mod frame;
pub mod registers;

pub use frame::{FrameEvents, FrameSequencer};
pub use registers::{Register, StatusFlags};

use crate::blip::{BlipBuffer, BlipSynth};
use crate::config::Region;
use crate::memory::{DmcReader, OpenBus};
use crate::{NesApuError, Result};
use channels::{Channel, Dmc, Noise, Square, Tap, Triangle, LENGTH_TABLE};
use registers::{END_ADDR, FRAME_COUNTER_ADDR, START_ADDR, STATUS_ADDR};
use std::fmt;

/// Emulated CPU clock, relative to the start of the current frame.
pub type CpuTime = i64;

/// Number of channels (pulse 1, pulse 2, triangle, noise, DMC).
pub const CHANNEL_COUNT: usize = 5;

/// Channel names, by index.
pub const CHANNEL_NAMES: [&str; CHANNEL_COUNT] = ["pulse1", "pulse2", "triangle", "noise", "dmc"];

// Relative mix weights of a full-range step on each channel.
const SQUARE_WEIGHT: f64 = 0.1128;
const TRIANGLE_WEIGHT: f64 = 0.12765;
const NOISE_WEIGHT: f64 = 0.0741;
const DMC_WEIGHT: f64 = 0.42545;

/// Called with the new earliest IRQ time whenever it changes.
pub type IrqNotifier = Box<dyn FnMut(Option<CpuTime>) + Send>;

/// The 2A03 sound engine.
pub struct NesApu {
    region: Region,

    square1: Square,
    square2: Square,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    // Both pulses share one synth, as on the chip's common mixer input.
    square_synth: BlipSynth,
    triangle_synth: BlipSynth,
    noise_synth: BlipSynth,
    dmc_synth: BlipSynth,

    frame: FrameSequencer,
    enables: StatusFlags,
    muted: [bool; CHANNEL_COUNT],
    last_time: CpuTime,
    earliest_irq: Option<CpuTime>,
    irq_notifier: Option<IrqNotifier>,
}

impl NesApu {
    /// Engine in power-on state with unit volume.
    pub fn new(region: Region) -> Self {
        let mut apu = NesApu {
            region,
            square1: Square::pulse1(),
            square2: Square::pulse2(),
            triangle: Triangle::new(),
            noise: Noise::new(),
            dmc: Dmc::new(region),
            square_synth: BlipSynth::new(15),
            triangle_synth: BlipSynth::new(15),
            noise_synth: BlipSynth::new(15),
            dmc_synth: BlipSynth::new(127),
            frame: FrameSequencer::new(region),
            enables: StatusFlags::empty(),
            muted: [false; CHANNEL_COUNT],
            last_time: 0,
            earliest_irq: None,
            irq_notifier: None,
        };
        apu.set_volume(1.0);
        apu.reset();
        apu
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Timing region this engine was built for.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Scale the overall output; 1.0 gives the hardware mix levels.
    pub fn set_volume(&mut self, volume: f64) {
        self.square_synth.volume(SQUARE_WEIGHT * volume);
        self.triangle_synth.volume(TRIANGLE_WEIGHT * volume);
        self.noise_synth.volume(NOISE_WEIGHT * volume);
        self.dmc_synth.volume(DMC_WEIGHT * volume);
    }

    /// Install or remove the IRQ notifier.
    pub fn set_irq_notifier(&mut self, notifier: Option<IrqNotifier>) {
        self.irq_notifier = notifier;
    }

    /// Silence or restore channel `index` (0-4).
    ///
    /// A muted channel keeps running; only its output is dropped. The level
    /// it holds is removed from (or returned to) `out` at the current time.
    pub fn set_channel_muted(&mut self, index: usize, muted: bool, out: &mut BlipBuffer) -> Result<()> {
        if index >= CHANNEL_COUNT {
            return Err(NesApuError::ConfigError(format!(
                "channel index {index} out of range (0-{})",
                CHANNEL_COUNT - 1
            )));
        }
        if self.muted[index] == muted {
            return Ok(());
        }
        self.muted[index] = muted;

        let level = self.channel_level(index);
        let delta = if muted { -level } else { level };
        let synth = match index {
            0 | 1 => &self.square_synth,
            2 => &self.triangle_synth,
            3 => &self.noise_synth,
            _ => &self.dmc_synth,
        };
        Tap::new(synth, Some(out)).offset(self.last_time, delta);
        tracing::debug!(channel = CHANNEL_NAMES[index], muted, "channel mute changed");
        Ok(())
    }

    /// Whether channel `index` is muted.
    pub fn is_channel_muted(&self, index: usize) -> bool {
        self.muted.get(index).copied().unwrap_or(false)
    }

    // ========================================================================
    // Host operations
    // ========================================================================

    /// Return every channel, the sequencer and the IRQ state to power-on.
    ///
    /// Mute settings, volume and the IRQ notifier are kept.
    pub fn reset(&mut self) {
        self.square1.reset();
        self.square2.reset();
        self.triangle.reset();
        self.noise.reset();
        self.dmc.reset();
        self.frame.reset();

        self.last_time = 0;
        self.enables = StatusFlags::empty();
        self.earliest_irq = None;

        // Power-on register state; nothing is output and the DMC is disabled
        // before any register could start a fetch.
        let mut bus = OpenBus(0);
        self.apply_write(0, FRAME_COUNTER_ADDR, 0x00, None, &mut bus);
        self.apply_write(0, STATUS_ADDR, 0x00, None, &mut bus);
        for addr in START_ADDR..=0x4013 {
            let value = if addr & 3 != 0 { 0x00 } else { 0x10 };
            self.apply_write(0, addr, value, None, &mut bus);
        }

        self.dmc.set_dac(0);
        self.triangle.settle_level();
        tracing::debug!(region = ?self.region, "APU reset");
    }

    /// Apply a register write at `time`.
    ///
    /// Addresses outside `$4000-$4017` are ignored, as are the unused
    /// `$4009`/`$400D` and the non-APU `$4014`/`$4016`.
    pub fn write_register(
        &mut self,
        time: CpuTime,
        addr: u16,
        value: u8,
        out: &mut BlipBuffer,
        reader: &mut dyn DmcReader,
    ) -> Result<()> {
        self.check_time(time, out)?;
        if let Some(register) = Register::from_addr(addr) {
            tracing::trace!(time, %register, value, "APU write");
        }
        self.apply_write(time, addr, value, Some(out), reader);
        Ok(())
    }

    /// Read `$4015` at `time`. Clears the frame interrupt flag.
    pub fn read_status(
        &mut self,
        time: CpuTime,
        out: &mut BlipBuffer,
        reader: &mut dyn DmcReader,
    ) -> Result<StatusFlags> {
        self.check_time(time, out)?;
        self.run_until((time - 1).max(self.last_time), Some(&mut *out), reader);

        let mut status = self.active_channels();
        status.set(StatusFlags::DMC_IRQ, self.dmc.irq_flag());
        status.set(StatusFlags::FRAME_IRQ, self.frame.irq_flag());

        self.run_until(time, Some(out), reader);
        if self.frame.irq_flag() {
            status |= StatusFlags::FRAME_IRQ;
            self.frame.clear_irq_flag();
            self.irq_changed();
        }
        Ok(status)
    }

    /// Run to `time` and make it the origin of the next frame.
    ///
    /// The caller ends the frame on `out` at the same time.
    pub fn end_frame(
        &mut self,
        time: CpuTime,
        out: &mut BlipBuffer,
        reader: &mut dyn DmcReader,
    ) -> Result<()> {
        self.check_time(time, out)?;
        self.run_until(time, Some(out), reader);

        self.last_time -= time;
        self.frame.end_frame(time);
        self.dmc.end_frame(time);
        if let Some(irq) = self.earliest_irq.as_mut() {
            *irq = (*irq - time).max(0);
        }
        tracing::trace!(time, "APU frame end");
        Ok(())
    }

    // ========================================================================
    // IRQ and DMC queries
    // ========================================================================

    /// Earliest time in this frame at which an IRQ is asserted, `Some(0)`
    /// when one already is, or `None` when none is scheduled.
    pub fn earliest_irq(&self) -> Option<CpuTime> {
        self.earliest_irq
    }

    /// Whether the frame or DMC interrupt flag is set.
    pub fn irq_pending(&self) -> bool {
        self.frame.irq_flag() || self.dmc.irq_flag()
    }

    /// Number of DMC fetches between the current time and `time`, and the
    /// earliest time by which they have all happened.
    pub fn count_dmc_reads(&self, time: CpuTime) -> (u32, CpuTime) {
        self.dmc.count_reads(time, self.last_time)
    }

    /// Collect and clear the CPU cycles stolen by DMC fetches so far.
    pub fn take_dmc_stall_cycles(&mut self) -> u32 {
        self.dmc.take_stall_cycles()
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Time the engine has run to within the current frame.
    pub fn last_time(&self) -> CpuTime {
        self.last_time
    }

    /// Output level of channel `index`, or 0 for an invalid index.
    pub fn channel_level(&self, index: usize) -> i32 {
        match index {
            0 => self.square1.level(),
            1 => self.square2.level(),
            2 => self.triangle.level(),
            3 => self.noise.level(),
            4 => self.dmc.level(),
            _ => 0,
        }
    }

    /// Channels whose length counter (or DMC byte count) is nonzero.
    pub fn active_channels(&self) -> StatusFlags {
        let mut active = StatusFlags::empty();
        active.set(StatusFlags::PULSE1, self.square1.is_active());
        active.set(StatusFlags::PULSE2, self.square2.is_active());
        active.set(StatusFlags::TRIANGLE, self.triangle.is_active());
        active.set(StatusFlags::NOISE, self.noise.is_active());
        active.set(StatusFlags::DMC, self.dmc.is_active());
        active
    }

    /// The frame sequencer.
    pub fn frame_sequencer(&self) -> &FrameSequencer {
        &self.frame
    }

    /// The DMC channel.
    pub fn dmc(&self) -> &Dmc {
        &self.dmc
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_time(&self, time: CpuTime, out: &BlipBuffer) -> Result<()> {
        if time < self.last_time {
            tracing::warn!(time, last = self.last_time, "time regression rejected");
            return Err(NesApuError::TimeRegression {
                time,
                last: self.last_time,
            });
        }
        let capacity = out.frame_capacity();
        if time > capacity {
            tracing::warn!(time, capacity, "time beyond buffer horizon rejected");
            return Err(NesApuError::FrameOverflow { time, capacity });
        }
        Ok(())
    }

    fn apply_write(
        &mut self,
        time: CpuTime,
        addr: u16,
        value: u8,
        mut out: Option<&mut BlipBuffer>,
        reader: &mut dyn DmcReader,
    ) {
        if !(START_ADDR..=END_ADDR).contains(&addr) {
            return;
        }
        self.run_until(time, out.as_deref_mut(), reader);

        if addr < 0x4014 {
            let index = usize::from((addr - START_ADDR) >> 2);
            let reg = usize::from(addr & 3);
            let length = u32::from(LENGTH_TABLE[usize::from(value >> 3)]);
            let enabled = self.enables.contains(StatusFlags::channel(index));
            match index {
                0 => write_tone(&mut self.square1, reg, value, enabled, length),
                1 => write_tone(&mut self.square2, reg, value, enabled, length),
                2 => write_tone(&mut self.triangle, reg, value, enabled, length),
                3 => write_tone(&mut self.noise, reg, value, enabled, length),
                _ => self.dmc.write_register(reg, value, self.last_time),
            }
            if reg == 3 {
                match index {
                    0 => self.square1.restart_phase(),
                    1 => self.square2.restart_phase(),
                    _ => {}
                }
            }
        } else if addr == STATUS_ADDR {
            self.enables = StatusFlags::from_bits_truncate(value) & StatusFlags::channels();
            if !self.enables.contains(StatusFlags::PULSE1) {
                self.square1.osc_mut().length_counter = 0;
            }
            if !self.enables.contains(StatusFlags::PULSE2) {
                self.square2.osc_mut().length_counter = 0;
            }
            if !self.enables.contains(StatusFlags::TRIANGLE) {
                self.triangle.osc_mut().length_counter = 0;
            }
            if !self.enables.contains(StatusFlags::NOISE) {
                self.noise.osc_mut().length_counter = 0;
            }
            self.dmc.clear_irq_flag();
            self.dmc
                .set_enabled(self.enables.contains(StatusFlags::DMC), reader, self.last_time);
        } else if addr == FRAME_COUNTER_ADDR {
            self.frame.write_mode(time, value);
        }

        self.irq_changed();
    }

    /// Run every channel from the last time to `end_time`, firing sequencer
    /// steps on the way. A step due exactly at `end_time` fires on the next call.
    fn run_until(
        &mut self,
        end_time: CpuTime,
        mut out: Option<&mut BlipBuffer>,
        reader: &mut dyn DmcReader,
    ) {
        if end_time <= self.last_time {
            return;
        }

        let muted = self.muted;
        self.dmc.run(
            self.last_time,
            end_time,
            &mut Tap::new(&self.dmc_synth, route(&mut out, muted[4])),
            reader,
        );

        let mut last = self.last_time;
        loop {
            let time = (last + self.frame.delay()).min(end_time);
            self.frame.advance(time - last);

            self.square1.run(last, time, &mut Tap::new(&self.square_synth, route(&mut out, muted[0])));
            self.square2.run(last, time, &mut Tap::new(&self.square_synth, route(&mut out, muted[1])));
            self.triangle.run(last, time, &mut Tap::new(&self.triangle_synth, route(&mut out, muted[2])));
            self.noise.run(last, time, &mut Tap::new(&self.noise_synth, route(&mut out, muted[3])));
            last = time;

            if time == end_time {
                break;
            }
            let events = self.frame.step(time);
            self.clock_frame(events);
        }
        self.last_time = end_time;
        self.irq_changed();
    }

    fn clock_frame(&mut self, events: FrameEvents) {
        if events.half {
            self.square1.osc_mut().clock_length(0x20);
            self.square2.osc_mut().clock_length(0x20);
            self.triangle.osc_mut().clock_length(0x80);
            self.noise.osc_mut().clock_length(0x20);
            self.square1.clock_sweep();
            self.square2.clock_sweep();
        }
        if events.quarter {
            self.square1.clock_envelope();
            self.square2.clock_envelope();
            self.triangle.clock_linear_counter();
            self.noise.clock_envelope();
        }
    }

    fn irq_changed(&mut self) {
        let earliest = if self.irq_pending() {
            Some(0)
        } else {
            match (self.dmc.next_irq(), self.frame.next_irq()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };
        if earliest != self.earliest_irq {
            self.earliest_irq = earliest;
            if let Some(notify) = self.irq_notifier.as_mut() {
                notify(earliest);
            }
        }
    }
}

impl Default for NesApu {
    fn default() -> Self {
        Self::new(Region::Ntsc)
    }
}

impl fmt::Debug for NesApu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NesApu")
            .field("region", &self.region)
            .field("last_time", &self.last_time)
            .field("enables", &self.enables)
            .field("muted", &self.muted)
            .field("frame", &self.frame)
            .field("earliest_irq", &self.earliest_irq)
            .finish_non_exhaustive()
    }
}

/// Write to a tone channel; a fourth-register write reloads the length
/// counter when the channel is enabled.
fn write_tone<C: Channel>(channel: &mut C, reg: usize, value: u8, enabled: bool, length: u32) {
    channel.write_register(reg, value);
    if reg == 3 && enabled {
        channel.osc_mut().length_counter = length;
    }
}

/// Output for one channel's tap: none while muted.
fn route<'b>(out: &'b mut Option<&mut BlipBuffer>, muted: bool) -> Option<&'b mut BlipBuffer> {
    if muted {
        None
    } else {
        out.as_deref_mut()
    }
}
