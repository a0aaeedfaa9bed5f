//! Audio file export
//!
//! Rendered PCM goes straight to disk; the samples are already 16-bit, so no
//! normalization or format conversion happens here.

pub mod wav;

pub use wav::write_wav;
