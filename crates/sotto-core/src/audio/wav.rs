//! Small WAV helpers shared by the pipeline stages.

use std::path::Path;

use crate::domain::DecodedAudio;
use crate::error::{Result, SottoError};

/// Read a WAV header and return the duration in seconds.
pub fn wav_duration(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        SottoError::AudioDecode(
            crate::error::ErrorDetails::new(format!("Failed to read WAV '{}'", path.display()))
                .with_context("file", path.display().to_string())
                .with_cause(e),
        )
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

/// Read a whole WAV file into canonical decoded form.
///
/// Accepts 16-bit int and 32-bit float sample formats; multi-channel input
/// is averaged down to mono.
pub fn read_decoded(path: &Path) -> Result<DecodedAudio> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        SottoError::AudioDecode(
            crate::error::ErrorDetails::new(format!("Failed to read WAV '{}'", path.display()))
                .with_context("file", path.display().to_string())
                .with_cause(e),
        )
    })?;
    let spec = reader.spec();

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| {
                SottoError::AudioDecode(
                    crate::error::ErrorDetails::new("WAV sample read failed")
                        .with_context("file", path.display().to_string())
                        .with_cause(e),
                )
            })?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| {
                SottoError::AudioDecode(
                    crate::error::ErrorDetails::new("WAV sample read failed")
                        .with_context("file", path.display().to_string())
                        .with_cause(e),
                )
            })?,
    };

    let samples = if spec.channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks(spec.channels as usize)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    let duration_s = if spec.sample_rate > 0 {
        samples.len() as f64 / spec.sample_rate as f64
    } else {
        0.0
    };

    Ok(DecodedAudio {
        sample_rate: spec.sample_rate,
        channels: 1,
        duration_s,
        samples,
    })
}

/// Convert i16 PCM to normalized f32 samples.
pub fn samples_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
}

/// Write mono i16 samples as a WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| {
        SottoError::AudioProcessing(
            crate::error::ErrorDetails::new(format!("Failed to create WAV '{}'", path.display()))
                .with_cause(e),
        )
    })?;
    for &sample in samples {
        writer.write_sample(sample).map_err(|e| {
            SottoError::AudioProcessing(
                crate::error::ErrorDetails::new("WAV write failed").with_cause(e),
            )
        })?;
    }
    writer.finalize().map_err(|e| {
        SottoError::AudioProcessing(
            crate::error::ErrorDetails::new("WAV finalize failed").with_cause(e),
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..16_000).map(|i| ((i % 100) * 300) as i16).collect();
        write_wav(&path, &samples, 16_000).unwrap();

        assert!((wav_duration(&path).unwrap() - 1.0).abs() < 1e-6);
        let decoded = read_decoded(&path).unwrap();
        assert_eq!(decoded.sample_rate, 16_000);
        assert_eq!(decoded.samples.len(), 16_000);
        assert!((decoded.duration_s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_file_is_decode_error() {
        let err = wav_duration(Path::new("/nonexistent/file.wav")).unwrap_err();
        assert_eq!(err.kind(), "AudioDecode");
    }

    #[test]
    fn f32_conversion_is_normalized() {
        let f = samples_to_f32(&[i16::MAX, 0, -i16::MAX]);
        assert!((f[0] - 1.0).abs() < 1e-6);
        assert_eq!(f[1], 0.0);
        assert!((f[2] + 1.0).abs() < 1e-6);
    }
}
