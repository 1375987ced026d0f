//! Audio file validation via ffprobe metadata.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use crate::domain::AudioFileInfo;
use crate::error::{ErrorDetails, Result, SottoError};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_name: Option<String>,
    bit_rate: Option<String>,
}

/// Probe `path` and enforce that it is a usable audio file.
///
/// Checks: file exists, is non-empty, has at least one audio stream,
/// `duration > 0`, `sample_rate > 0`, `channels > 0`.
pub fn validate_audio_file(path: &Path) -> Result<AudioFileInfo> {
    let metadata = std::fs::metadata(path).map_err(|_| {
        SottoError::AudioDecode(
            ErrorDetails::new(format!("Audio file not found: '{}'", path.display()))
                .with_context("file", path.display().to_string())
                .with_suggestion("Check the file path for typos"),
        )
    })?;
    if metadata.len() == 0 {
        return Err(SottoError::AudioDecode(
            ErrorDetails::new(format!("Audio file is empty: '{}'", path.display()))
                .with_context("file", path.display().to_string())
                .with_suggestion("Re-export or re-download the recording"),
        ));
    }

    let result = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output();

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SottoError::missing_ffprobe());
        }
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SottoError::AudioDecode(
            ErrorDetails::new(format!("ffprobe could not read '{}'", path.display()))
                .with_context("file", path.display().to_string())
                .with_context("stderr", stderr.chars().take(300).collect::<String>())
                .with_suggestion("The file may not be a supported audio format"),
        ));
    }

    let probe: ProbeOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
        SottoError::AudioDecode(
            ErrorDetails::new("ffprobe returned unparseable metadata")
                .with_context("file", path.display().to_string())
                .with_cause(e),
        )
    })?;

    let audio_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| {
            SottoError::AudioDecode(
                ErrorDetails::new(format!("No audio stream in '{}'", path.display()))
                    .with_context("file", path.display().to_string())
                    .with_suggestion("The file may be video-only or corrupted"),
            )
        })?;

    let format = probe.format.as_ref();
    let duration_s: f64 = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);
    let sample_rate: u32 = audio_stream
        .sample_rate
        .as_deref()
        .and_then(|r| r.parse().ok())
        .unwrap_or(0);
    let channels = audio_stream.channels.unwrap_or(0);

    if duration_s <= 0.0 || sample_rate == 0 || channels == 0 {
        return Err(SottoError::AudioDecode(
            ErrorDetails::new(format!("Invalid audio stream in '{}'", path.display()))
                .with_context("duration_s", duration_s)
                .with_context("sample_rate", sample_rate)
                .with_context("channels", channels as u64)
                .with_suggestion("The stream reports zero duration or rate - re-encode the file"),
        ));
    }

    let bitrate_kbps = audio_stream
        .bit_rate
        .as_deref()
        .or(format.and_then(|f| f.bit_rate.as_deref()))
        .and_then(|b| b.parse::<u32>().ok())
        .map(|b| b / 1000);

    Ok(AudioFileInfo {
        duration_s,
        sample_rate,
        channels,
        codec: audio_stream.codec_name.clone().unwrap_or_default(),
        bitrate_kbps,
        format_name: format.and_then(|f| f.format_name.clone()).unwrap_or_default(),
        file_size_mb: metadata.len() as f64 / (1024.0 * 1024.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_decode_error() {
        let err = validate_audio_file(Path::new("/nonexistent/audio.mp3")).unwrap_err();
        assert_eq!(err.kind(), "AudioDecode");
        assert!(err.message().contains("not found"));
    }

    #[test]
    fn empty_file_is_rejected_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::File::create(&path).unwrap();
        let err = validate_audio_file(&path).unwrap_err();
        assert!(err.message().contains("empty"));
    }

    #[test]
    fn probe_json_parses_expected_shape() {
        let raw = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "pcm_s16le",
                 "sample_rate": "16000", "channels": 1, "bit_rate": "256000"}
            ],
            "format": {"duration": "3.200000", "format_name": "wav", "bit_rate": "256000"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(probe.streams.len(), 1);
        assert_eq!(probe.streams[0].channels, Some(1));
        assert_eq!(probe.format.unwrap().duration.as_deref(), Some("3.200000"));
    }

    #[test]
    fn non_audio_bytes_fail_validation() {
        // Requires ffprobe on PATH; skip silently when unavailable.
        if Command::new("ffprobe").arg("-version").output().is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_audio.wav");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"this is not audio data at all").unwrap();
        assert!(validate_audio_file(&path).is_err());
    }
}
