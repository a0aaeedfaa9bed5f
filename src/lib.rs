//! NES APU Emulator
//!
//! A cycle-accurate emulator of the Ricoh 2A03 audio processing unit found in
//! the Nintendo Entertainment System, paired with a band-limited synthesizer
//! that turns the chip's level transitions into alias-free PCM at any output
//! rate.
//!
//! # Features
//! - Both pulse channels with duty, envelope, sweep and length counter
//! - Triangle channel with linear counter
//! - Noise channel with both LFSR tap modes
//! - DMC sample playback with DMA fetches, IRQ and CPU stall accounting
//! - 4-step and 5-step frame sequencer with frame IRQ
//! - Band-limited step synthesis (`blip_buf`) with DC-blocking output
//! - Register-log replay and WAV export
//!
//! # Time model
//! Every write carries the emulated CPU clock at which it happened, counted
//! from the start of the current frame. Times must not decrease within a
//! frame. `run_frame(end_time)` closes the frame; the next frame starts again
//! at 0.
//!
//! # Crate feature flags
//! - `export-wav` (default): WAV file output (`export`) and the `nes-apu` CLI
//!
//! # Quick start
//! ```no_run
//! use nes_apu::{ApuConfig, NesSound};
//!
//! let mut sound = NesSound::initialize(|_addr: u16| 0u8, ApuConfig::ntsc(44_100)).unwrap();
//! sound.write_register(0, 0x4015, 0x01).unwrap(); // enable pulse 1
//! sound.write_register(0, 0x4000, 0xBF).unwrap(); // 50% duty, constant volume 15
//! sound.write_register(0, 0x4002, 0xFD).unwrap(); // period low
//! sound.write_register(0, 0x4003, 0x00).unwrap(); // period high, length load
//!
//! let mut pcm = vec![0i16; 4096];
//! let count = sound.run_frame(29_830, &mut pcm).unwrap();
//! println!("{count} samples");
//! ```

#![warn(missing_docs)]

pub mod apu; // 2A03 register/event engine
pub mod blip; // Band-limited synthesis
pub mod config; // Configuration
pub mod memory; // DMC memory access
pub mod script; // Register log replay
pub mod system; // Host adapter

#[cfg(feature = "export-wav")]
pub mod export; // WAV output

/// Error types for APU emulator operations
#[derive(thiserror::Error, Debug)]
pub enum NesApuError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A time earlier than an already accepted one within the same frame
    #[error("Time {time} precedes last accepted time {last}")]
    TimeRegression {
        /// Rejected time
        time: i64,
        /// Last accepted time of the frame
        last: i64,
    },

    /// A time beyond what the sample buffer can hold for this frame
    #[error("Time {time} exceeds the buffer horizon of {capacity} clocks")]
    FrameOverflow {
        /// Rejected time
        time: i64,
        /// Latest representable time of the current frame
        capacity: i64,
    },

    /// Error while parsing a register log or configuration file
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for NesApuError {
    /// Converts a String into `NesApuError::Other`.
    ///
    /// Prefer the specific variants (`ConfigError`, `ParseError`, ...) where
    /// the failure has a known category.
    fn from(msg: String) -> Self {
        NesApuError::Other(msg)
    }
}

impl From<&str> for NesApuError {
    /// Converts a string slice into `NesApuError::Other`.
    fn from(msg: &str) -> Self {
        NesApuError::Other(msg.to_string())
    }
}

impl From<serde_json::Error> for NesApuError {
    fn from(err: serde_json::Error) -> Self {
        NesApuError::ParseError(err.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, NesApuError>;

// Public API exports
pub use apu::{NesApu, StatusFlags};
pub use blip::{BlipBuffer, BlipSynth};
pub use config::{ApuConfig, Region};
pub use memory::DmcReader;
pub use script::{LogFrame, RegisterLog, RegisterWrite};
pub use system::NesSound;

#[cfg(feature = "export-wav")]
pub use export::write_wav;
