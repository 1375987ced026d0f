//! Audio sources for file-first workflows.
//!
//! Every source resolves to a concrete file on disk before the pipeline
//! runs, keeping the orchestrator independent of how audio was acquired.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::recorder::{Recorder, Recording};
use crate::audio::wav;
use crate::error::{ErrorDetails, Result, SottoError};

/// Resolve an input source to a real audio file on disk.
pub trait AudioSource {
    /// Return a path to an audio file, creating/recording it under
    /// `work_dir` if necessary. The returned path MUST exist.
    fn resolve_to_path(&self, work_dir: &Path) -> Result<PathBuf>;
}

/// An existing audio file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AudioSource for FileSource {
    fn resolve_to_path(&self, _work_dir: &Path) -> Result<PathBuf> {
        if !self.path.exists() {
            return Err(SottoError::AudioDecode(
                ErrorDetails::new(format!("Audio file not found: '{}'", self.path.display()))
                    .with_context("file", self.path.display().to_string())
                    .with_suggestion("Check the file path for typos"),
            ));
        }
        Ok(self.path.clone())
    }
}

/// In-memory PCM wrapped into a WAV file under the work directory.
pub struct MemorySource {
    pcm: Vec<u8>,
    sample_rate: u32,
    channels: u16,
    sample_width_bytes: u16,
}

impl MemorySource {
    pub fn new(pcm: Vec<u8>, sample_rate: u32, channels: u16, sample_width_bytes: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SottoError::config("sample_rate must be positive"));
        }
        if channels == 0 {
            return Err(SottoError::config("channels must be positive"));
        }
        if sample_width_bytes != 2 {
            return Err(SottoError::config(
                "only 16-bit PCM buffers are supported (sample_width_bytes = 2)",
            ));
        }
        Ok(Self {
            pcm,
            sample_rate,
            channels,
            sample_width_bytes,
        })
    }
}

impl AudioSource for MemorySource {
    fn resolve_to_path(&self, work_dir: &Path) -> Result<PathBuf> {
        let bytes_per_frame = (self.sample_width_bytes * self.channels) as usize;
        if self.pcm.is_empty() || self.pcm.len() % bytes_per_frame != 0 {
            return Err(SottoError::AudioProcessing(
                ErrorDetails::new("PCM buffer is empty or not aligned to frame size")
                    .with_context("buffer_len", self.pcm.len() as u64)
                    .with_context("bytes_per_frame", bytes_per_frame as u64),
            ));
        }

        std::fs::create_dir_all(work_dir)?;
        let target = work_dir.join("memory_audio.wav");

        // Interleaved little-endian i16, averaged down to mono
        let samples: Vec<i16> = self
            .pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let mono: Vec<i16> = if self.channels <= 1 {
            samples
        } else {
            samples
                .chunks(self.channels as usize)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect()
        };

        wav::write_wav(&target, &mono, self.sample_rate)?;
        Ok(target)
    }
}

/// Microphone capture into a WAV file under the work directory.
///
/// Recording is duration-bound to avoid interactive prompts in automated
/// workflows.
pub struct MicSource {
    duration: Duration,
    recorder: Box<dyn Recorder>,
}

impl MicSource {
    pub fn new(duration: Duration, recorder: Box<dyn Recorder>) -> Result<Self> {
        if duration.is_zero() {
            return Err(SottoError::config("recording duration must be positive"));
        }
        Ok(Self { duration, recorder })
    }

    /// Capture from the default system microphone.
    #[cfg(feature = "microphone")]
    pub fn default_device(duration: Duration) -> Result<Self> {
        Self::new(duration, Box::new(crate::audio::recorder::CpalRecorder))
    }
}

impl AudioSource for MicSource {
    fn resolve_to_path(&self, work_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(work_dir)?;
        let target = work_dir.join("mic_capture.wav");

        let Recording {
            samples,
            sample_rate,
            channels,
        } = self.recorder.record(self.duration)?;

        if samples.is_empty() {
            return Err(SottoError::AudioProcessing(
                ErrorDetails::new("No audio captured from microphone")
                    .with_suggestion("Check the microphone is not muted")
                    .with_suggestion("Check another application is not holding the device"),
            ));
        }

        let mono: Vec<i16> = if channels <= 1 {
            samples
        } else {
            samples
                .chunks(channels as usize)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect()
        };

        wav::write_wav(&target, &mono, sample_rate)?;
        crate::verbose!(
            "Captured {:.1}s from microphone to {}",
            mono.len() as f64 / sample_rate as f64,
            target.display()
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRecorder {
        recording: Recording,
    }

    impl Recorder for FakeRecorder {
        fn record(&self, _duration: Duration) -> Result<Recording> {
            Ok(self.recording.clone())
        }
    }

    #[test]
    fn file_source_returns_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.wav");
        std::fs::write(&path, b"stub").unwrap();

        let resolved = FileSource::new(&path).resolve_to_path(dir.path()).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn file_source_rejects_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSource::new("/nonexistent/audio.wav")
            .resolve_to_path(dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), "AudioDecode");
    }

    #[test]
    fn memory_source_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let pcm: Vec<u8> = (0..3200i16).flat_map(|s| s.to_le_bytes()).collect();
        let source = MemorySource::new(pcm, 16_000, 1, 2).unwrap();

        let path = source.resolve_to_path(dir.path()).unwrap();
        assert!(path.exists());
        let decoded = wav::read_decoded(&path).unwrap();
        assert_eq!(decoded.samples.len(), 3200);
        assert_eq!(decoded.sample_rate, 16_000);
    }

    #[test]
    fn memory_source_rejects_empty_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(Vec::new(), 16_000, 1, 2).unwrap();
        assert!(source.resolve_to_path(dir.path()).is_err());
    }

    #[test]
    fn memory_source_rejects_misaligned_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let source = MemorySource::new(vec![0u8; 5], 16_000, 2, 2).unwrap();
        assert!(source.resolve_to_path(dir.path()).is_err());
    }

    #[test]
    fn memory_source_validates_construction() {
        assert!(MemorySource::new(vec![0, 0], 0, 1, 2).is_err());
        assert!(MemorySource::new(vec![0, 0], 16_000, 0, 2).is_err());
        assert!(MemorySource::new(vec![0, 0], 16_000, 1, 3).is_err());
    }

    #[test]
    fn mic_source_writes_mono_wav_from_stereo_capture() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = FakeRecorder {
            recording: Recording {
                samples: vec![100, 200, 300, 400],
                sample_rate: 48_000,
                channels: 2,
            },
        };
        let source = MicSource::new(Duration::from_secs(1), Box::new(recorder)).unwrap();

        let path = source.resolve_to_path(dir.path()).unwrap();
        let decoded = wav::read_decoded(&path).unwrap();
        assert_eq!(decoded.samples, vec![150, 350]);
        assert_eq!(decoded.sample_rate, 48_000);
    }

    #[test]
    fn mic_source_rejects_empty_capture() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = FakeRecorder {
            recording: Recording {
                samples: vec![],
                sample_rate: 16_000,
                channels: 1,
            },
        };
        let source = MicSource::new(Duration::from_secs(1), Box::new(recorder)).unwrap();
        assert!(source.resolve_to_path(dir.path()).is_err());
    }
}
