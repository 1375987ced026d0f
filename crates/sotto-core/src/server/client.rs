//! Blocking client for the warm-model daemon.
//!
//! Connection refused maps to `DaemonNotRunning`, an elapsed deadline to
//! `DaemonTimeout`, and non-2xx or error payloads to `Daemon`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::TranscriptSegment;
use crate::error::{ErrorDetails, Result, SottoError};

use super::protocol::{
    BatchTranscribeRequest, BatchTranscribeResponse, DEFAULT_DAEMON_HOST, DEFAULT_DAEMON_PORT,
    HealthResponse, RefineRequest, RefineResponse, ShutdownResponse, StatusResponse,
    TranscribeRequest, TranscribeResponse,
};

/// Timeout for transcription calls (model inference can be slow).
pub const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for ping/status/shutdown calls.
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct DaemonClient {
    base_url: String,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
        }
    }

    fn client(timeout: Duration) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                SottoError::Daemon(ErrorDetails::new("Failed to create HTTP client").with_cause(e))
            })
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SottoError {
        if err.is_connect() {
            SottoError::DaemonNotRunning(
                ErrorDetails::new(format!("Cannot connect to daemon at {}", self.base_url))
                    .with_suggestion("Start it with: sotto daemon start"),
            )
        } else if err.is_timeout() {
            SottoError::DaemonTimeout(
                ErrorDetails::new(format!("Daemon request timed out ({})", self.base_url))
                    .with_suggestion("Check 'sotto daemon logs' for a stuck inference"),
            )
        } else {
            SottoError::Daemon(ErrorDetails::new("Daemon request failed").with_cause(err))
        }
    }

    fn check_status(&self, response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        Err(SottoError::Daemon(
            ErrorDetails::new(format!("Daemon returned status {}", status))
                .with_context("body", body.chars().take(300).collect::<String>()),
        ))
    }

    /// Cheap liveness probe: true when `/health` answers 2xx.
    pub fn ping(&self) -> bool {
        self.health().is_ok()
    }

    pub fn health(&self) -> Result<HealthResponse> {
        let response = Self::client(CONTROL_TIMEOUT)?
            .get(format!("{}/health", self.base_url))
            .send()
            .map_err(|e| self.map_transport_error(e))?;
        self.check_status(response)?
            .json()
            .map_err(|e| SottoError::Daemon(ErrorDetails::new("Invalid health response").with_cause(e)))
    }

    pub fn status(&self) -> Result<StatusResponse> {
        let response = Self::client(CONTROL_TIMEOUT)?
            .get(format!("{}/status", self.base_url))
            .send()
            .map_err(|e| self.map_transport_error(e))?;
        self.check_status(response)?
            .json()
            .map_err(|e| SottoError::Daemon(ErrorDetails::new("Invalid status response").with_cause(e)))
    }

    /// Transcribe a batch of files as one request. The daemon returns the
    /// stitched segments of the whole batch as a single group.
    pub fn transcribe(&self, audio_paths: &[PathBuf], language: &str) -> Result<Vec<TranscriptSegment>> {
        let request = TranscribeRequest {
            audio_paths: audio_paths.iter().map(|p| p.display().to_string()).collect(),
            language: language.to_string(),
            max_new_tokens: 256,
            request_id: None,
        };
        let response = Self::client(TRANSCRIBE_TIMEOUT)?
            .post(format!("{}/transcribe", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| self.map_transport_error(e))?;
        let body: TranscribeResponse = self.check_status(response)?.json().map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Invalid transcribe response").with_cause(e))
        })?;

        if !body.success {
            return Err(SottoError::Daemon(
                ErrorDetails::new(body.error.unwrap_or_else(|| "Daemon transcription failed".into())),
            ));
        }

        Ok(body
            .segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| seg.into_segment(format!("segment-{}", i)))
            .collect())
    }

    /// Transcribe a single file.
    pub fn transcribe_single(&self, audio_path: &Path, language: &str) -> Result<Vec<TranscriptSegment>> {
        self.transcribe(std::slice::from_ref(&audio_path.to_path_buf()), language)
    }

    /// Batched transcription with per-file result boundaries preserved.
    pub fn batch_transcribe(
        &self,
        audio_paths: &[PathBuf],
        language: &str,
    ) -> Result<Vec<Vec<TranscriptSegment>>> {
        let request = BatchTranscribeRequest {
            audio_paths: audio_paths.iter().map(|p| p.display().to_string()).collect(),
            language: language.to_string(),
        };
        let response = Self::client(TRANSCRIBE_TIMEOUT)?
            .post(format!("{}/batch_transcribe", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| self.map_transport_error(e))?;
        let body: BatchTranscribeResponse = self.check_status(response)?.json().map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Invalid batch response").with_cause(e))
        })?;

        if !body.success {
            return Err(SottoError::Daemon(
                ErrorDetails::new(body.error.unwrap_or_else(|| "Daemon batch failed".into())),
            ));
        }

        Ok(body
            .results
            .into_iter()
            .map(|item| {
                item.segments
                    .into_iter()
                    .enumerate()
                    .map(|(i, seg)| seg.into_segment(format!("segment-{}", i)))
                    .collect()
            })
            .collect())
    }

    pub fn refine(&self, text: &str, instructions: Option<&str>) -> Result<String> {
        let request = RefineRequest {
            text: text.to_string(),
            instructions: instructions.map(String::from),
        };
        let response = Self::client(TRANSCRIBE_TIMEOUT)?
            .post(format!("{}/refine", self.base_url))
            .json(&request)
            .send()
            .map_err(|e| self.map_transport_error(e))?;
        let body: RefineResponse = self.check_status(response)?.json().map_err(|e| {
            SottoError::Daemon(ErrorDetails::new("Invalid refine response").with_cause(e))
        })?;

        if !body.success {
            return Err(SottoError::Daemon(
                ErrorDetails::new(body.error.unwrap_or_else(|| "Daemon refinement failed".into())),
            ));
        }
        Ok(body.refined_text)
    }

    pub fn shutdown(&self) -> Result<ShutdownResponse> {
        let response = Self::client(CONTROL_TIMEOUT)?
            .post(format!("{}/shutdown", self.base_url))
            .send()
            .map_err(|e| self.map_transport_error(e))?;
        self.check_status(response)?
            .json()
            .map_err(|e| SottoError::Daemon(ErrorDetails::new("Invalid shutdown response").with_cause(e)))
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new(DEFAULT_DAEMON_HOST, DEFAULT_DAEMON_PORT)
    }
}
