//! FFmpeg-based audio decoding to canonical PCM.
//!
//! Any input format ffmpeg understands is normalised to mono 16 kHz
//! 16-bit LE WAV, the form every downstream stage expects.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Result, SottoError};

/// Decoder that shells out to the ffmpeg binary.
pub struct FfmpegDecoder {
    ffmpeg_path: String,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Decode `input` into a canonical WAV at `output`.
    ///
    /// Equivalent to `ffmpeg -i <in> -ar 16000 -ac 1 -sample_fmt s16 -y <out>`.
    pub fn decode_to_wav(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let result = Command::new(&self.ffmpeg_path)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-sample_fmt")
            .arg("s16")
            .arg("-y")
            .arg(output)
            .output();

        let output_status = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SottoError::missing_ffmpeg());
            }
            Err(e) => return Err(e.into()),
        };

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let code = output_status.status.code().unwrap_or(-1);
            return Err(SottoError::decode_from_ffmpeg_stderr(input, code, &stderr));
        }

        crate::verbose!("Decoded {} -> {}", input.display(), output.display());
        Ok(output.to_path_buf())
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_dependency_error() {
        let decoder = FfmpegDecoder::with_binary("/nonexistent/ffmpeg-binary");
        let dir = tempfile::tempdir().unwrap();
        let err = decoder
            .decode_to_wav(&dir.path().join("in.mp3"), &dir.path().join("out.wav"))
            .unwrap_err();
        assert_eq!(err.kind(), "Dependency");
    }
}
