//! Unified error types for sotto-core
//!
//! Every domain error carries a rich payload (message, context map,
//! actionable suggestions, timestamp, optional cause) and serialises to a
//! fixed-shape JSON dict for GUI and log consumers.
//!
//! # Error Hierarchy
//!
//! ```text
//! SottoError
//!   ├── AudioDecode          - Transcoder failures, unreadable files
//!   ├── AudioProcessing      - Preprocessing filter-chain failures
//!   ├── Vad                  - No speech detected, VAD library errors
//!   ├── UnsplittableSegment  - Speech span exceeds max chunk length
//!   ├── Engine               - Model load / inference failures
//!   ├── Transcription        - Inference failed for a specific file
//!   ├── Refinement           - Refiner output failed validation
//!   ├── Configuration        - Unknown preset, invalid enum, bad profile
//!   ├── Dependency           - Missing ffmpeg / model weights / GPU runtime
//!   ├── DaemonNotRunning / DaemonTimeout / DaemonStart - daemon IPC outcomes
//!   └── Io                   - Generic I/O errors
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// Rich payload shared by all domain errors.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub message: String,
    pub context: BTreeMap<String, Value>,
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub cause: Option<String>,
}

impl ErrorDetails {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: BTreeMap::new(),
            suggestions: Vec::new(),
            timestamp: Utc::now(),
            cause: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Top-level error type for sotto-core operations
#[derive(Debug, thiserror::Error)]
pub enum SottoError {
    /// Transcoder non-zero exit, unreadable file, empty stream
    #[error("Audio decode error: {0}")]
    AudioDecode(ErrorDetails),

    /// Preprocessing filter chain failure
    #[error("Audio processing error: {0}")]
    AudioProcessing(ErrorDetails),

    /// VAD found no speech, or the underlying detector failed
    #[error("VAD error: {0}")]
    Vad(ErrorDetails),

    /// A single speech span exceeds the chunk limit with no legal split
    #[error("Unsplittable segment: {0}")]
    UnsplittableSegment(ErrorDetails),

    /// Model load / inference failure
    #[error("Engine error: {0}")]
    Engine(ErrorDetails),

    /// Engine inference failed for a specific file
    #[error("Transcription error: {0}")]
    Transcription(ErrorDetails),

    /// Refiner output failed validation
    #[error("Refinement error: {0}")]
    Refinement(ErrorDetails),

    /// Unknown preset, invalid enum value, unsupported engine kind
    #[error("Configuration error: {0}")]
    Configuration(ErrorDetails),

    /// Missing external binary, model weights, or GPU runtime
    #[error("Dependency error: {0}")]
    Dependency(ErrorDetails),

    /// Daemon replied with a non-2xx status or an error payload
    #[error("Daemon error: {0}")]
    Daemon(ErrorDetails),

    /// Daemon connection refused
    #[error("Daemon not running: {0}")]
    DaemonNotRunning(ErrorDetails),

    /// Daemon request deadline elapsed
    #[error("Daemon timeout: {0}")]
    DaemonTimeout(ErrorDetails),

    /// Daemon failed to start
    #[error("Daemon start error: {0}")]
    DaemonStart(ErrorDetails),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type using SottoError
pub type Result<T> = std::result::Result<T, SottoError>;

impl SottoError {
    /// Stable kind name used as `error_type` in serialised dicts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AudioDecode(_) => "AudioDecode",
            Self::AudioProcessing(_) => "AudioProcessing",
            Self::Vad(_) => "Vad",
            Self::UnsplittableSegment(_) => "UnsplittableSegment",
            Self::Engine(_) => "Engine",
            Self::Transcription(_) => "Transcription",
            Self::Refinement(_) => "Refinement",
            Self::Configuration(_) => "Configuration",
            Self::Dependency(_) => "Dependency",
            Self::Daemon(_) => "Daemon",
            Self::DaemonNotRunning(_) => "DaemonNotRunning",
            Self::DaemonTimeout(_) => "DaemonTimeout",
            Self::DaemonStart(_) => "DaemonStart",
            Self::Io(_) => "Io",
        }
    }

    /// The rich payload, when the variant carries one.
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::AudioDecode(d)
            | Self::AudioProcessing(d)
            | Self::Vad(d)
            | Self::UnsplittableSegment(d)
            | Self::Engine(d)
            | Self::Transcription(d)
            | Self::Refinement(d)
            | Self::Configuration(d)
            | Self::Dependency(d)
            | Self::Daemon(d)
            | Self::DaemonNotRunning(d)
            | Self::DaemonTimeout(d)
            | Self::DaemonStart(d) => Some(d),
            Self::Io(_) => None,
        }
    }

    /// The error message without the kind prefix.
    pub fn message(&self) -> String {
        match self.details() {
            Some(d) => d.message.clone(),
            None => self.to_string(),
        }
    }

    /// Process exit code for CLI consumers.
    ///
    /// 2 = user-input/config error, 3 = engine/dependency initialisation
    /// error, 1 = any other runtime failure. 130 (interruption) is handled
    /// by the CLI itself.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 2,
            Self::Dependency(_) | Self::Engine(_) => 3,
            _ => 1,
        }
    }

    /// Dialog title for GUI consumers: "AudioDecode" -> "Audio Decode Error".
    pub fn gui_title(&self) -> String {
        let kind = self.kind();
        let mut title = String::with_capacity(kind.len() + 8);
        for (i, ch) in kind.chars().enumerate() {
            if ch.is_uppercase() && i > 0 {
                title.push(' ');
            }
            title.push(ch);
        }
        title.push_str(" Error");
        title
    }

    /// Serialise to the fixed GUI/log dict shape.
    pub fn to_dict(&self) -> Value {
        let (context, suggestions, timestamp, cause) = match self.details() {
            Some(d) => (
                Value::Object(d.context.clone().into_iter().collect()),
                json!(d.suggestions),
                d.timestamp.to_rfc3339(),
                d.cause.clone().map(Value::String).unwrap_or(Value::Null),
            ),
            None => (json!({}), json!([]), Utc::now().to_rfc3339(), Value::Null),
        };
        json!({
            "error_type": self.kind(),
            "message": self.message(),
            "context": context,
            "suggestions": suggestions,
            "timestamp": timestamp,
            "cause": cause,
        })
    }

    /// Rebuild an error from its serialised dict. Returns `None` when the
    /// dict does not have the expected shape.
    pub fn from_dict(dict: &Value) -> Option<Self> {
        let error_type = dict.get("error_type")?.as_str()?;
        let message = dict.get("message")?.as_str()?.to_string();

        let mut details = ErrorDetails::new(message);
        if let Some(context) = dict.get("context").and_then(Value::as_object) {
            details.context = context.clone().into_iter().collect();
        }
        if let Some(suggestions) = dict.get("suggestions").and_then(Value::as_array) {
            details.suggestions = suggestions
                .iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect();
        }
        if let Some(ts) = dict.get("timestamp").and_then(Value::as_str) {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
                details.timestamp = parsed.with_timezone(&Utc);
            }
        }
        details.cause = dict
            .get("cause")
            .and_then(Value::as_str)
            .map(String::from);

        let err = match error_type {
            "AudioDecode" => Self::AudioDecode(details),
            "AudioProcessing" => Self::AudioProcessing(details),
            "Vad" => Self::Vad(details),
            "UnsplittableSegment" => Self::UnsplittableSegment(details),
            "Engine" => Self::Engine(details),
            "Transcription" => Self::Transcription(details),
            "Refinement" => Self::Refinement(details),
            "Configuration" => Self::Configuration(details),
            "Dependency" => Self::Dependency(details),
            "Daemon" => Self::Daemon(details),
            "DaemonNotRunning" => Self::DaemonNotRunning(details),
            "DaemonTimeout" => Self::DaemonTimeout(details),
            "DaemonStart" => Self::DaemonStart(details),
            _ => return None,
        };
        Some(err)
    }

    /// Render the error for terminal display: message, bulleted context,
    /// numbered suggestions, root cause.
    pub fn format_error(&self) -> String {
        let mut out = format!("✗ Error: {}", self.message());
        if let Some(d) = self.details() {
            if !d.context.is_empty() {
                out.push_str("\n\nDetails:");
                for (key, value) in &d.context {
                    let rendered = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    out.push_str(&format!("\n  • {}: {}", key, rendered));
                }
            }
            if !d.suggestions.is_empty() {
                out.push_str("\n\nPossible solutions:");
                for (i, suggestion) in d.suggestions.iter().enumerate() {
                    out.push_str(&format!("\n  {}. {}", i + 1, suggestion));
                }
            }
            if let Some(cause) = &d.cause {
                out.push_str(&format!("\n\nCaused by: {}", cause));
            }
        }
        out
    }

    // Factory constructors ------------------------------------------------

    /// Decode failure from an ffmpeg non-zero exit, with suggestions
    /// derived from stderr keywords.
    pub fn decode_from_ffmpeg_stderr(input: &Path, exit_code: i32, stderr: &str) -> Self {
        let mut details = ErrorDetails::new(format!(
            "Failed to decode '{}'",
            input.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ))
        .with_context("input_file", input.display().to_string())
        .with_context("ffmpeg_exit_code", exit_code)
        .with_context("stderr", stderr.chars().take(500).collect::<String>());

        if stderr.contains("Invalid data") {
            details = details.with_suggestion("The file may be corrupted - try re-downloading or re-exporting it");
        }
        if stderr.contains("Permission denied") {
            details = details.with_suggestion("Check file permissions - the file may not be readable");
        }
        if stderr.contains("No such file") {
            details = details.with_suggestion("The file path does not exist - check for typos");
        }
        if details.suggestions.is_empty() {
            details = details
                .with_suggestion("Run with --verbose to see the full ffmpeg output")
                .with_suggestion("Check the file plays in a media player");
        }
        Self::AudioDecode(details)
    }

    /// VAD produced an empty span list.
    pub fn no_speech_detected(audio_path: &Path, duration_s: f64, threshold: f32) -> Self {
        Self::Vad(
            ErrorDetails::new("No speech detected during VAD; aborting transcription")
                .with_context("file", audio_path.display().to_string())
                .with_context("duration", format!("{:.1}s", duration_s))
                .with_context("vad_threshold", threshold as f64)
                .with_suggestion("Lower the VAD threshold (e.g. --vad-threshold 0.3) to capture quieter speech")
                .with_suggestion("Verify the recording actually contains speech")
                .with_suggestion("Try the 'sensitive' segmentation preset"),
        )
    }

    /// A single speech span is longer than the chunk limit.
    pub fn unsplittable_segment(start_s: f64, end_s: f64, max_chunk_s: f64) -> Self {
        Self::UnsplittableSegment(
            ErrorDetails::new(format!(
                "Speech span of {:.1}s exceeds {:.1}s with no silence to split at",
                end_s - start_s,
                max_chunk_s
            ))
            .with_context("segment_start", format!("{:.1}s", start_s))
            .with_context("segment_end", format!("{:.1}s", end_s))
            .with_context("segment_duration", format!("{:.1}s", end_s - start_s))
            .with_context("max_allowed", format!("{:.1}s", max_chunk_s))
            .with_suggestion("Raise max_chunk_s in the segmentation profile")
            .with_suggestion("Lower max_speech_duration_s so VAD splits long spans earlier"),
        )
    }

    /// The ffmpeg binary is not on PATH.
    pub fn missing_ffmpeg() -> Self {
        Self::Dependency(
            ErrorDetails::new("FFmpeg is required but was not found")
                .with_context("binary", "ffmpeg")
                .with_suggestion("Install FFmpeg: https://ffmpeg.org/download.html")
                .with_suggestion("Linux: sudo apt install ffmpeg / macOS: brew install ffmpeg"),
        )
    }

    /// The ffprobe binary is not on PATH.
    pub fn missing_ffprobe() -> Self {
        Self::Dependency(
            ErrorDetails::new("ffprobe is required but was not found")
                .with_context("binary", "ffprobe")
                .with_suggestion("ffprobe ships with FFmpeg: https://ffmpeg.org/download.html"),
        )
    }

    /// Model weights missing on disk.
    pub fn missing_model(kind: &str, path: &Path) -> Self {
        Self::Dependency(
            ErrorDetails::new(format!("{} model not found", kind))
                .with_context("model_path", path.display().to_string())
                .with_suggestion("Download the model and point model_cache_dir at it")
                .with_suggestion("Run 'sotto daemon status' to check the configured model"),
        )
    }

    /// GPU runtime unavailable for a requested operation.
    pub fn missing_cuda(operation: &str) -> Self {
        Self::Dependency(
            ErrorDetails::new(format!("CUDA is required for {} but is not available", operation))
                .with_context("operation", operation.to_string())
                .with_suggestion("Install the NVIDIA driver and CUDA runtime")
                .with_suggestion("Or select device=cpu in the engine config"),
        )
    }

    /// Unknown preset/profile name.
    pub fn invalid_profile(name: &str, available: &[&str]) -> Self {
        Self::Configuration(
            ErrorDetails::new(format!("Unknown profile: '{}'", name))
                .with_context("requested", name.to_string())
                .with_context("available", available.join(", "))
                .with_suggestion(format!("Choose one of: {}", available.join(", "))),
        )
    }

    /// Engine inference failed for a specific file.
    pub fn engine_inference_failed(engine: &str, audio_path: &Path, cause: impl fmt::Display) -> Self {
        Self::Transcription(
            ErrorDetails::new(format!("{} inference failed for '{}'", engine, audio_path.display()))
                .with_context("engine", engine.to_string())
                .with_context("file", audio_path.display().to_string())
                .with_cause(cause)
                .with_suggestion("Check GPU memory is not exhausted")
                .with_suggestion("Retry with a smaller model or device=cpu"),
        )
    }

    /// Refiner produced unusable output.
    pub fn refinement_output_invalid(original_len: usize, refined_len: usize, reason: &str) -> Self {
        Self::Refinement(
            ErrorDetails::new(format!("Refiner returned invalid output: {}", reason))
                .with_context("original_length", original_len as u64)
                .with_context("refined_length", refined_len as u64)
                .with_suggestion("Re-run with --no-refine to keep the raw transcript")
                .with_suggestion("Try a different refinement model"),
        )
    }

    /// Create a plain configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(ErrorDetails::new(msg))
    }

    /// Create a plain engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(ErrorDetails::new(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn ffmpeg_stderr_keywords_become_suggestions() {
        let err = SottoError::decode_from_ffmpeg_stderr(
            &PathBuf::from("/tmp/audio.mp3"),
            1,
            "Invalid data found when processing input",
        );
        let details = err.details().unwrap();
        assert_eq!(details.context["ffmpeg_exit_code"], 1);
        assert!(details.suggestions.iter().any(|s| s.contains("corrupted")));
    }

    #[test]
    fn ffmpeg_stderr_permission_denied() {
        let err = SottoError::decode_from_ffmpeg_stderr(
            &PathBuf::from("/tmp/audio.mp3"),
            1,
            "Permission denied",
        );
        let suggestions = &err.details().unwrap().suggestions;
        assert!(suggestions.iter().any(|s| s.to_lowercase().contains("permission")));
    }

    #[test]
    fn ffmpeg_stderr_unknown_falls_back_to_generic() {
        let err = SottoError::decode_from_ffmpeg_stderr(
            &PathBuf::from("/tmp/audio.mp3"),
            1,
            "Some unknown failure",
        );
        let suggestions = &err.details().unwrap().suggestions;
        assert!(suggestions.iter().any(|s| s.contains("--verbose")));
    }

    #[test]
    fn serialization_round_trip_preserves_payload() {
        let err = SottoError::no_speech_detected(&PathBuf::from("/tmp/silent.wav"), 30.5, 0.5);
        let dict = err.to_dict();
        assert_eq!(dict["error_type"], "Vad");

        let restored = SottoError::from_dict(&dict).unwrap();
        assert_eq!(restored.message(), err.message());
        let (a, b) = (err.details().unwrap(), restored.details().unwrap());
        assert_eq!(a.context, b.context);
        assert_eq!(a.suggestions, b.suggestions);
    }

    #[test]
    fn from_dict_rejects_unknown_kind() {
        let dict = json!({"error_type": "Bogus", "message": "x"});
        assert!(SottoError::from_dict(&dict).is_none());
    }

    #[test]
    fn unsplittable_segment_mentions_both_durations() {
        let err = SottoError::unsplittable_segment(10.0, 60.0, 40.0);
        assert!(err.message().contains("50.0s"));
        assert!(err.message().contains("40.0s"));
        assert_eq!(err.details().unwrap().context["max_allowed"], "40.0s");
    }

    #[test]
    fn gui_title_splits_camel_case() {
        let err = SottoError::decode_from_ffmpeg_stderr(&PathBuf::from("a"), 1, "");
        assert_eq!(err.gui_title(), "Audio Decode Error");
    }

    #[test]
    fn exit_codes_follow_cli_contract() {
        assert_eq!(SottoError::invalid_profile("x", &["a"]).exit_code(), 2);
        assert_eq!(SottoError::missing_ffmpeg().exit_code(), 3);
        assert_eq!(
            SottoError::no_speech_detected(&PathBuf::from("a"), 1.0, 0.5).exit_code(),
            1
        );
    }

    #[test]
    fn format_error_renders_context_and_suggestions() {
        let err = SottoError::missing_ffmpeg();
        let rendered = err.format_error();
        assert!(rendered.contains("✗ Error:"));
        assert!(rendered.contains("Details:"));
        assert!(rendered.contains("Possible solutions:"));
        assert!(rendered.contains("1."));
    }
}
