//! Wire protocol for the warm-model daemon.
//!
//! The daemon speaks HTTP over loopback TCP and, alternatively,
//! newline-delimited JSON over a Unix socket. Both share these DTOs;
//! socket requests carry a `type` discriminator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::TranscriptSegment;

pub const DEFAULT_DAEMON_HOST: &str = "127.0.0.1";
pub const DEFAULT_DAEMON_PORT: u16 = 8765;

/// Unix socket for the NDJSON protocol variant.
pub fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/sotto-daemon.sock")
}

/// Per-user cache root; created 0700 on Unix.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sotto")
}

pub fn pid_file_path() -> PathBuf {
    cache_dir().join("daemon.pid")
}

pub fn log_file_path() -> PathBuf {
    cache_dir().join("daemon.log")
}

/// Create the cache dir, restricting it to the current user on Unix.
pub fn ensure_cache_dir() -> std::io::Result<PathBuf> {
    let dir = cache_dir();
    std::fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_new_tokens() -> i32 {
    256
}

/// One timed segment on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentResponse {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SegmentResponse {
    pub fn from_segment(segment: &TranscriptSegment) -> Self {
        Self {
            start: segment.start_s,
            end: segment.end_s,
            text: segment.text().to_string(),
            speaker: None,
            language: segment.language.clone(),
        }
    }

    pub fn into_segment(self, id: impl Into<String>) -> TranscriptSegment {
        TranscriptSegment {
            id: id.into(),
            start_s: self.start,
            end_s: self.end,
            raw_text: self.text,
            refined_text: None,
            language: self.language,
            confidence: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_name: String,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_name: String,
    pub device: String,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeRequest {
    pub audio_paths: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub success: bool,
    #[serde(default)]
    pub segments: Vec<SegmentResponse>,
    #[serde(default)]
    pub inference_time_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscribeResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            segments: Vec::new(),
            inference_time_s: 0.0,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineResponse {
    pub success: bool,
    #[serde(default)]
    pub refined_text: String,
    #[serde(default)]
    pub inference_time_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTranscribeRequest {
    pub audio_paths: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResponse {
    pub segments: Vec<SegmentResponse>,
    pub inference_time_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTranscribeResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<BatchItemResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub success: bool,
    pub message: String,
}

/// Request envelope for the Unix-socket NDJSON variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketRequest {
    Transcribe(TranscribeRequest),
    Status,
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcribe_request_defaults() {
        let req: TranscribeRequest =
            serde_json::from_str(r#"{"audio_paths": ["/tmp/a.wav"]}"#).unwrap();
        assert_eq!(req.language, "en");
        assert_eq!(req.max_new_tokens, 256);
        assert!(req.request_id.is_none());
    }

    #[test]
    fn socket_request_discriminator() {
        let req: SocketRequest =
            serde_json::from_str(r#"{"type": "transcribe", "audio_paths": ["/a.wav"]}"#).unwrap();
        assert!(matches!(req, SocketRequest::Transcribe(r) if r.audio_paths == ["/a.wav"]));

        let status: SocketRequest = serde_json::from_str(r#"{"type": "status"}"#).unwrap();
        assert!(matches!(status, SocketRequest::Status));

        let shutdown: SocketRequest = serde_json::from_str(r#"{"type": "shutdown"}"#).unwrap();
        assert!(matches!(shutdown, SocketRequest::Shutdown));
    }

    #[test]
    fn unknown_socket_type_is_rejected() {
        assert!(serde_json::from_str::<SocketRequest>(r#"{"type": "bogus"}"#).is_err());
    }

    #[test]
    fn segment_round_trip() {
        let segment = TranscriptSegment {
            id: "segment-3".into(),
            start_s: 1.5,
            end_s: 3.2,
            raw_text: "test transcript".into(),
            refined_text: None,
            language: Some("en".into()),
            confidence: None,
        };
        let wire = SegmentResponse::from_segment(&segment);
        assert_eq!(wire.start, 1.5);
        assert_eq!(wire.text, "test transcript");
        assert!(wire.speaker.is_none());

        let back = wire.into_segment("segment-3");
        assert_eq!(back, segment);
    }

    #[test]
    fn wire_segment_prefers_refined_text() {
        let mut segment = TranscriptSegment::new("s0", 0.0, 1.0, "raw");
        segment.refined_text = Some("Refined.".into());
        assert_eq!(SegmentResponse::from_segment(&segment).text, "Refined.");
    }

    #[test]
    fn failure_response_shape() {
        let resp = TranscribeResponse::failure("model not loaded");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "model not loaded");
        assert!(json["segments"].as_array().unwrap().is_empty());
    }
}
