//! APU register map
//!
//! Names for the CPU-visible registers at `$4000-$4017` and the bits of the
//! `$4015` status byte.

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt;

/// First APU register address.
pub const START_ADDR: u16 = 0x4000;
/// Last APU register address.
pub const END_ADDR: u16 = 0x4017;
/// Channel enable / status register.
pub const STATUS_ADDR: u16 = 0x4015;
/// Frame sequencer mode register.
pub const FRAME_COUNTER_ADDR: u16 = 0x4017;

/// Writable APU registers. `$4009`, `$400D`, `$4014` and `$4016` belong to
/// other hardware or are unused, so they have no variant.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum Register {
    Pulse1Control = 0x4000,
    Pulse1Sweep = 0x4001,
    Pulse1TimerLow = 0x4002,
    Pulse1Length = 0x4003,
    Pulse2Control = 0x4004,
    Pulse2Sweep = 0x4005,
    Pulse2TimerLow = 0x4006,
    Pulse2Length = 0x4007,
    TriangleLinear = 0x4008,
    TriangleTimerLow = 0x400A,
    TriangleLength = 0x400B,
    NoiseControl = 0x400C,
    NoisePeriod = 0x400E,
    NoiseLength = 0x400F,
    DmcControl = 0x4010,
    DmcDac = 0x4011,
    DmcAddress = 0x4012,
    DmcLength = 0x4013,
    Status = 0x4015,
    FrameCounter = 0x4017,
}

impl Register {
    /// Look up the register at `addr`.
    pub fn from_addr(addr: u16) -> Option<Self> {
        Self::from_u16(addr)
    }

    /// Bus address.
    pub fn addr(self) -> u16 {
        self as u16
    }

    /// Channel index 0-4 owning this register, or `None` for `$4015`/`$4017`.
    pub fn channel(self) -> Option<usize> {
        let addr = self.addr();
        if addr < STATUS_ADDR {
            Some(usize::from((addr - START_ADDR) >> 2))
        } else {
            None
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Pulse1Control => "PULSE1_CTRL",
            Register::Pulse1Sweep => "PULSE1_SWEEP",
            Register::Pulse1TimerLow => "PULSE1_LO",
            Register::Pulse1Length => "PULSE1_HI",
            Register::Pulse2Control => "PULSE2_CTRL",
            Register::Pulse2Sweep => "PULSE2_SWEEP",
            Register::Pulse2TimerLow => "PULSE2_LO",
            Register::Pulse2Length => "PULSE2_HI",
            Register::TriangleLinear => "TRI_LINEAR",
            Register::TriangleTimerLow => "TRI_LO",
            Register::TriangleLength => "TRI_HI",
            Register::NoiseControl => "NOISE_CTRL",
            Register::NoisePeriod => "NOISE_LO",
            Register::NoiseLength => "NOISE_HI",
            Register::DmcControl => "DMC_FREQ",
            Register::DmcDac => "DMC_RAW",
            Register::DmcAddress => "DMC_START",
            Register::DmcLength => "DMC_LEN",
            Register::Status => "SND_CHN",
            Register::FrameCounter => "FRAME_CTR",
        };
        write!(f, "{name} (${:04X})", self.addr())
    }
}

bitflags! {
    /// Bits of the `$4015` status read. The low five bits double as the
    /// channel enable mask on write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        /// Pulse 1 length counter is nonzero
        const PULSE1 = 0x01;
        /// Pulse 2 length counter is nonzero
        const PULSE2 = 0x02;
        /// Triangle length counter is nonzero
        const TRIANGLE = 0x04;
        /// Noise length counter is nonzero
        const NOISE = 0x08;
        /// DMC has sample bytes remaining
        const DMC = 0x10;
        /// Frame interrupt flag
        const FRAME_IRQ = 0x40;
        /// DMC interrupt flag
        const DMC_IRQ = 0x80;
    }
}

impl StatusFlags {
    /// Flag for channel `index` (0 = pulse 1 ... 4 = DMC).
    pub fn channel(index: usize) -> Self {
        Self::from_bits_truncate(1 << (index & 7)) & Self::channels()
    }

    /// All five channel bits.
    pub fn channels() -> Self {
        Self::PULSE1 | Self::PULSE2 | Self::TRIANGLE | Self::NOISE | Self::DMC
    }
}
