//! Blocking client for the daemon's Unix-socket NDJSON protocol.
//!
//! One JSON request per line, one JSON response per line. This is the
//! lightweight alternative to the HTTP client for same-host callers that
//! want to avoid an HTTP stack.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::TranscriptSegment;
use crate::error::{ErrorDetails, Result, SottoError};

use super::protocol::{
    ShutdownResponse, SocketRequest, StatusResponse, TranscribeRequest, TranscribeResponse,
    default_socket_path,
};

pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn round_trip(&self, request: &SocketRequest) -> Result<String> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|e| {
            SottoError::DaemonNotRunning(
                ErrorDetails::new(format!(
                    "Cannot connect to daemon socket {}",
                    self.socket_path.display()
                ))
                .with_cause(e)
                .with_suggestion("Start it with: sotto daemon start"),
            )
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;

        let mut writer = stream.try_clone()?;
        let request_json = serde_json::to_string(request).map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Request serialisation failed").with_cause(e))
        })?;
        writer.write_all(request_json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        let mut response = String::new();
        let mut reader = BufReader::new(stream);
        reader.read_line(&mut response).map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut
            {
                SottoError::DaemonTimeout(
                    ErrorDetails::new("Daemon socket read timed out")
                        .with_suggestion("Check 'sotto daemon logs' for a stuck inference"),
                )
            } else {
                e.into()
            }
        })?;
        Ok(response.trim().to_string())
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let raw = self.round_trip(&SocketRequest::Status)?;
        serde_json::from_str(&raw).map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Invalid status response").with_cause(e))
        })
    }

    pub fn transcribe(&self, audio_paths: &[PathBuf], language: &str) -> Result<Vec<TranscriptSegment>> {
        let request = SocketRequest::Transcribe(TranscribeRequest {
            audio_paths: audio_paths.iter().map(|p| p.display().to_string()).collect(),
            language: language.to_string(),
            max_new_tokens: 256,
            request_id: None,
        });
        let raw = self.round_trip(&request)?;
        let response: TranscribeResponse = serde_json::from_str(&raw).map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Invalid transcribe response").with_cause(e))
        })?;
        if !response.success {
            return Err(SottoError::Daemon(ErrorDetails::new(
                response.error.unwrap_or_else(|| "Daemon transcription failed".into()),
            )));
        }
        Ok(response
            .segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| seg.into_segment(format!("segment-{}", i)))
            .collect())
    }

    pub fn shutdown(&self) -> Result<ShutdownResponse> {
        let raw = self.round_trip(&SocketRequest::Shutdown)?;
        serde_json::from_str(&raw).map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Invalid shutdown response").with_cause(e))
        })
    }

    /// True when the socket file exists and answers a status request.
    pub fn is_available(&self) -> bool {
        self.socket_path.exists() && self.status().is_ok()
    }
}

impl Default for SocketClient {
    fn default() -> Self {
        Self::new(default_socket_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::path::Path;

    /// Serve exactly one NDJSON exchange from a scratch socket.
    fn one_shot_server(dir: &Path, response: &'static str) -> PathBuf {
        let socket_path = dir.join("test-daemon.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        std::thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                let _ = reader.read_line(&mut line);
                let mut stream = stream;
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.write_all(b"\n");
            }
        });
        socket_path
    }

    #[test]
    fn missing_socket_maps_to_not_running() {
        let client = SocketClient::new("/nonexistent/daemon.sock");
        let err = client.status().unwrap_err();
        assert_eq!(err.kind(), "DaemonNotRunning");
        assert!(!client.is_available());
    }

    #[test]
    fn status_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = one_shot_server(
            dir.path(),
            r#"{"status":"ready","model_loaded":true,"model_name":"parakeet-tdt-0.6b-v3","device":"cuda","uptime_seconds":12.5,"requests_handled":3}"#,
        );
        let client = SocketClient::new(&socket).with_timeout(Duration::from_secs(5));
        let status = client.status().unwrap();
        assert!(status.model_loaded);
        assert_eq!(status.model_name, "parakeet-tdt-0.6b-v3");
        assert_eq!(status.requests_handled, 3);
    }

    #[test]
    fn transcribe_failure_payload_becomes_error() {
        let dir = tempfile::tempdir().unwrap();
        let socket = one_shot_server(
            dir.path(),
            r#"{"success":false,"segments":[],"inference_time_s":0.0,"error":"Model not loaded"}"#,
        );
        let client = SocketClient::new(&socket).with_timeout(Duration::from_secs(5));
        let err = client
            .transcribe(&[PathBuf::from("/tmp/a.wav")], "en")
            .unwrap_err();
        assert_eq!(err.kind(), "Daemon");
        assert!(err.message().contains("Model not loaded"));
    }
}
