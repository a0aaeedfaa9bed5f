//! WAV file export functionality

use crate::{NesApuError, Result};
use std::path::Path;

/// Write 16-bit mono samples to a WAV file.
///
/// # Examples
///
/// ```no_run
/// use nes_apu::{write_wav, ApuConfig, NesSound, RegisterLog, Region};
/// use nes_apu::script::demo_sample_byte;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut sound = NesSound::initialize(demo_sample_byte, ApuConfig::default())?;
/// let pcm = RegisterLog::demo(Region::Ntsc).play(&mut sound)?;
/// write_wav("demo.wav", &pcm, 44_100)?;
/// # Ok(())
/// # }
/// ```
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)
        .map_err(|e| NesApuError::AudioFileError(format!("Failed to create WAV file: {}", e)))?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| NesApuError::AudioFileError(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| NesApuError::AudioFileError(format!("Failed to finalize WAV file: {}", e)))?;

    tracing::debug!(path = %path.as_ref().display(), samples = samples.len(), "WAV written");
    Ok(())
}
