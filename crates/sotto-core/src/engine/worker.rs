//! In-process engine worker that keeps a single engine instance warm.
//!
//! The worker owns zero or one live engine per profile. Transcription is
//! routed through the warm daemon when it is up with its model resident;
//! otherwise the local engine is loaded lazily and driven directly. A
//! daemon failure mid-call falls back to the local engine transparently.

use std::path::{Path, PathBuf};

use crate::config::EngineProfile;
use crate::domain::{EngineMetadata, TranscriptSegment};
use crate::error::Result;
use crate::refine::{Refiner, RefinementMode};
use crate::server::DaemonClient;

use super::{TranscriptionEngine, build_engine};

pub struct EngineWorker {
    profile: EngineProfile,
    engine: Option<Box<dyn TranscriptionEngine>>,
    refiner: Option<Box<dyn Refiner>>,
    use_daemon: bool,
    daemon_client: DaemonClient,
    daemon_checked: bool,
    daemon_available: bool,
    used_daemon: bool,
    warnings: Vec<String>,
}

impl EngineWorker {
    /// The engine is not loaded eagerly; the first transcription either
    /// hits the daemon or triggers a local load.
    pub fn new(profile: EngineProfile) -> Self {
        Self {
            profile,
            engine: None,
            refiner: None,
            use_daemon: true,
            daemon_client: DaemonClient::default(),
            daemon_checked: false,
            daemon_available: false,
            used_daemon: false,
            warnings: Vec::new(),
        }
    }

    /// Use a pre-built engine (tests, bench harnesses).
    pub fn with_engine(profile: EngineProfile, engine: Box<dyn TranscriptionEngine>) -> Self {
        let mut worker = Self::new(profile);
        worker.engine = Some(engine);
        worker
    }

    pub fn without_daemon(mut self) -> Self {
        self.use_daemon = false;
        self
    }

    pub fn with_refiner(mut self, refiner: Box<dyn Refiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn used_daemon(&self) -> bool {
        self.used_daemon
    }

    /// Health-probe the daemon, caching the answer after the first check.
    fn check_daemon(&mut self) -> bool {
        if self.daemon_checked {
            return self.daemon_available;
        }
        self.daemon_checked = true;
        self.daemon_available = self.use_daemon
            && self
                .daemon_client
                .health()
                .map(|h| h.model_loaded)
                .unwrap_or(false);
        self.daemon_available
    }

    fn ensure_engine(&mut self) -> Result<&mut Box<dyn TranscriptionEngine>> {
        if self.engine.is_none() {
            self.engine = Some(build_engine(
                self.profile.kind,
                self.profile.config.clone(),
            )?);
        }
        Ok(self.engine.as_mut().expect("engine just set"))
    }

    /// Transcribe a single file.
    pub fn transcribe(&mut self, audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
        let groups = self.transcribe_batch(std::slice::from_ref(&audio_path.to_path_buf()))?;
        Ok(groups.into_iter().flatten().collect())
    }

    /// Transcribe multiple files, preferring the warm daemon.
    ///
    /// The daemon handles per-file batching internally, so its answer is
    /// returned as a single segment group. When the daemon call fails the
    /// local engine takes over and per-file groups are preserved.
    pub fn transcribe_batch(&mut self, audio_paths: &[PathBuf]) -> Result<Vec<Vec<TranscriptSegment>>> {
        if self.check_daemon() {
            let language = self.profile.options.language_or_default().to_string();
            match self.daemon_client.transcribe(audio_paths, &language) {
                Ok(segments) => {
                    self.used_daemon = true;
                    return Ok(vec![segments]);
                }
                Err(e) => {
                    crate::verbose!("Daemon transcription failed, using local engine: {}", e);
                    self.warnings
                        .push(format!("Daemon unavailable mid-run, fell back to local engine: {}", e));
                    self.daemon_available = false;
                }
            }
        }

        let options = self.profile.options.clone();
        self.ensure_engine()?
            .transcribe_files_batch(audio_paths, &options)
    }

    /// Refine transcript text via the attached refiner; identity when no
    /// refiner is present.
    pub fn refine_text(&mut self, text: &str, instructions: Option<&str>) -> Result<String> {
        match &self.refiner {
            Some(refiner) => refiner.refine(text, instructions),
            None => Ok(text.to_string()),
        }
    }

    /// Refine segments via the attached refiner.
    pub fn refine_segments(
        &mut self,
        segments: &[TranscriptSegment],
        mode: Option<RefinementMode>,
        instructions: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        match &self.refiner {
            Some(refiner) => refiner.refine_segments(segments, mode, instructions),
            None => Ok(segments.to_vec()),
        }
    }

    /// Engine metadata. After a daemon run this is synthesised from the
    /// profile config without loading a local engine.
    pub fn metadata(&mut self) -> Result<EngineMetadata> {
        if self.used_daemon {
            return Ok(EngineMetadata {
                model_name: self.profile.config.model_name.clone(),
                device: "daemon".to_string(),
                precision: self.profile.config.compute_type.to_string(),
            });
        }
        Ok(self.ensure_engine()?.metadata())
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, EngineKind, TranscriptionOptions};
    use crate::domain::segments_to_text;
    use crate::error::{Result, SottoError};

    fn profile() -> EngineProfile {
        EngineProfile::new(
            EngineKind::WhisperTurbo,
            EngineConfig::new(EngineKind::WhisperTurbo, None).unwrap(),
            TranscriptionOptions::default(),
        )
    }

    struct StubEngine {
        text: &'static str,
    }

    impl TranscriptionEngine for StubEngine {
        fn transcribe_file(
            &mut self,
            _audio_path: &Path,
            _options: &TranscriptionOptions,
        ) -> Result<Vec<TranscriptSegment>> {
            Ok(vec![TranscriptSegment::new("segment-0", 0.0, 1.0, self.text)])
        }

        fn metadata(&self) -> EngineMetadata {
            EngineMetadata {
                model_name: "stub".into(),
                device: "cpu".into(),
                precision: "fp32".into(),
            }
        }
    }

    struct FailingRefiner;
    impl Refiner for FailingRefiner {
        fn refine(&self, _text: &str, _instructions: Option<&str>) -> Result<String> {
            Err(SottoError::refinement_output_invalid(10, 0, "empty output"))
        }
    }

    #[test]
    fn local_batch_without_daemon_keeps_per_file_groups() {
        let mut worker =
            EngineWorker::with_engine(profile(), Box::new(StubEngine { text: "hello" }))
                .without_daemon();
        let paths = vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")];
        let groups = worker.transcribe_batch(&paths).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(!worker.used_daemon());
    }

    #[test]
    fn refine_text_without_refiner_is_identity() {
        let mut worker =
            EngineWorker::with_engine(profile(), Box::new(StubEngine { text: "x" })).without_daemon();
        assert_eq!(worker.refine_text("um hello", None).unwrap(), "um hello");
    }

    #[test]
    fn refine_failure_propagates_for_caller_to_demote() {
        let mut worker = EngineWorker::with_engine(profile(), Box::new(StubEngine { text: "x" }))
            .without_daemon()
            .with_refiner(Box::new(FailingRefiner));
        assert!(worker.refine_text("hello", None).is_err());
    }

    #[test]
    fn metadata_reads_local_engine_when_daemon_unused() {
        let mut worker =
            EngineWorker::with_engine(profile(), Box::new(StubEngine { text: "x" })).without_daemon();
        let meta = worker.metadata().unwrap();
        assert_eq!(meta.model_name, "stub");
        assert_eq!(meta.device, "cpu");
    }

    #[test]
    fn daemon_probe_failure_falls_back_to_local_engine() {
        // No daemon is listening in the test environment: the probe fails
        // and the worker must drive the provided engine instead.
        let mut worker = EngineWorker::with_engine(profile(), Box::new(StubEngine { text: "local" }));
        let groups = worker.transcribe_batch(&[PathBuf::from("a.wav")]).unwrap();
        assert_eq!(segments_to_text(&groups[0]), "local");
        assert!(!worker.used_daemon());
    }
}
