//! WAV persistence for generated audio.

use std::fs;
use std::path::Path;

use crate::LongplayError;

/// Write mono f32 samples to a WAV file, creating parent directories as
/// needed.
pub fn write_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<(), LongplayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_mono_float_samples_losslessly() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tone.wav");
        let samples = [0.0_f32, 0.25, -0.5, 1.0];
        write_wav(&samples, 32_000, &path).expect("write wav");

        let mut reader = hound::WavReader::open(&path).expect("open wav");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 32_000);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(spec.bits_per_sample, 32);

        let decoded: Vec<f32> = reader
            .samples::<f32>()
            .map(|sample| sample.expect("sample"))
            .collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("out").join("tone.wav");
        write_wav(&[0.1, 0.2], 16_000, &path).expect("write wav");
        assert!(path.exists());
    }
}
