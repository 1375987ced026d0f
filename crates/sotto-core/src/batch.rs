//! Batch transcription runner.
//!
//! Composes the single-file workflow across many inputs with bounded
//! parallelism, continue-on-error semantics, and combined-output
//! assembly. Workers share no mutable state; contention is only on the
//! daemon and on output-directory file creation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::audio::preprocess::PreprocessingConfig;
use crate::config::{EngineProfile, SegmentationProfile};
use crate::error::{Result, SottoError};
use crate::progress::ProgressTracker;
use crate::server::DaemonManager;
use crate::sources::FileSource;
use crate::workflow::{WorkflowOptions, transcribe_file_workflow};

/// Whether the runner should involve the warm daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaemonMode {
    Never,
    #[default]
    Auto,
    Always,
}

impl fmt::Display for DaemonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonMode::Never => write!(f, "never"),
            DaemonMode::Auto => write!(f, "auto"),
            DaemonMode::Always => write!(f, "always"),
        }
    }
}

impl FromStr for DaemonMode {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "never" => Ok(DaemonMode::Never),
            "auto" => Ok(DaemonMode::Auto),
            "always" => Ok(DaemonMode::Always),
            other => Err(SottoError::invalid_profile(other, &["never", "auto", "always"])),
        }
    }
}

/// Result of transcribing a single file in a batch.
#[derive(Debug)]
pub struct BatchResult {
    pub source_file: PathBuf,
    pub success: bool,
    pub transcript_text: Option<String>,
    pub output_path: Option<PathBuf>,
    pub error: Option<SottoError>,
    /// Wall-clock time spent on this file
    pub duration_s: f64,
    /// Duration of the transcribed audio
    pub audio_duration_s: f64,
}

/// Statistics for a batch run.
#[derive(Debug, Default, PartialEq)]
pub struct BatchStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_s: f64,
    pub audio_duration_s: f64,
}

/// Runs the transcription workflow over a list of files.
pub struct BatchRunner {
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    engine_profile: EngineProfile,
    segmentation_profile: SegmentationProfile,
    pub daemon_mode: DaemonMode,
    pub parallel: usize,
    pub continue_on_error: bool,
    pub preprocess: Option<PreprocessingConfig>,
    pub refine: bool,
}

impl BatchRunner {
    pub fn new(
        files: Vec<PathBuf>,
        output_dir: PathBuf,
        engine_profile: EngineProfile,
        segmentation_profile: SegmentationProfile,
    ) -> Self {
        Self {
            files,
            output_dir,
            engine_profile,
            segmentation_profile,
            daemon_mode: DaemonMode::Auto,
            parallel: 1,
            continue_on_error: true,
            preprocess: None,
            refine: false,
        }
    }

    /// Execute the batch. Returns one `BatchResult` per processed file in
    /// completion order.
    pub fn run(&self, progress: Option<&dyn ProgressTracker>) -> Result<Vec<BatchResult>> {
        std::fs::create_dir_all(&self.output_dir)?;

        if self.daemon_mode != DaemonMode::Never {
            let manager = DaemonManager::default();
            let auto_start = self.daemon_mode == DaemonMode::Always;
            if !manager.ensure_running(auto_start, progress) {
                if let Some(progress) = progress {
                    progress.print("Daemon not available, using direct engine", Some("yellow"));
                }
            }
        }

        if self.parallel.max(1) == 1 {
            Ok(self.run_sequential(progress))
        } else {
            Ok(self.run_parallel(progress))
        }
    }

    fn run_sequential(&self, progress: Option<&dyn ProgressTracker>) -> Vec<BatchResult> {
        let total = self.files.len();
        let task_id = progress.map(|p| {
            p.add_step(&format!("Batch transcription (0/{})", total), Some(total as u64))
        });

        let mut results = Vec::with_capacity(total);
        for (i, file) in self.files.iter().enumerate() {
            if let (Some(progress), Some(task_id)) = (progress, task_id) {
                progress.update(
                    task_id,
                    Some(&format!(
                        "Transcribing {} ({}/{})",
                        file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
                        i + 1,
                        total
                    )),
                    Some(i as u64),
                );
            }

            let result = self.transcribe_single(file);
            self.report_file(progress, task_id, &result);
            let stop = !result.success && !self.continue_on_error;
            results.push(result);

            if stop {
                if let Some(progress) = progress {
                    progress.print("Stopping due to error", Some("red"));
                }
                break;
            }
        }

        if let (Some(progress), Some(task_id)) = (progress, task_id) {
            progress.complete(task_id);
        }
        results
    }

    /// Bounded worker pool; results are collected as they complete
    /// (out-of-order). The stop flag is honoured between files, never
    /// preempting an in-flight one.
    fn run_parallel(&self, progress: Option<&dyn ProgressTracker>) -> Vec<BatchResult> {
        let total = self.files.len();
        let workers = self.parallel.min(total.max(1));
        let task_id = progress.map(|p| {
            p.add_step(
                &format!("Batch transcription (parallel, {} workers)", workers),
                Some(total as u64),
            )
        });

        let (work_tx, work_rx) = crossbeam_channel::unbounded::<PathBuf>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<BatchResult>();
        for file in &self.files {
            let _ = work_tx.send(file.clone());
        }
        drop(work_tx);

        let stop = AtomicBool::new(false);
        let mut results = Vec::with_capacity(total);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let stop = &stop;
                scope.spawn(move || {
                    while let Ok(file) = work_rx.recv() {
                        if stop.load(Ordering::SeqCst) {
                            break;
                        }
                        let result = self.transcribe_single(&file);
                        if !result.success && !self.continue_on_error {
                            stop.store(true, Ordering::SeqCst);
                        }
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for (completed, result) in result_rx.iter().enumerate() {
                if let (Some(progress), Some(task_id)) = (progress, task_id) {
                    progress.update(
                        task_id,
                        Some(&format!("Completed {}/{}", completed + 1, total)),
                        Some((completed + 1) as u64),
                    );
                }
                self.report_file(progress, None, &result);
                results.push(result);
            }
        });

        if let (Some(progress), Some(task_id)) = (progress, task_id) {
            progress.complete(task_id);
        }
        results
    }

    fn report_file(
        &self,
        progress: Option<&dyn ProgressTracker>,
        _task_id: Option<crate::progress::TaskId>,
        result: &BatchResult,
    ) {
        let Some(progress) = progress else { return };
        let name = result
            .source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if result.success {
            progress.print(&format!("  ✓ {}", name), Some("green"));
        } else {
            let error = result
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".into());
            progress.print(&format!("  ✗ {}: {}", name, error), Some("red"));
        }
    }

    /// Transcribe one file and save its transcript to the output dir.
    fn transcribe_single(&self, file: &Path) -> BatchResult {
        let started = Instant::now();
        let options = WorkflowOptions {
            refine: self.refine,
            preprocess: self.preprocess.clone(),
            use_daemon: self.daemon_mode != DaemonMode::Never,
            ..Default::default()
        };

        let outcome = transcribe_file_workflow(
            &FileSource::new(file),
            &self.engine_profile,
            &self.segmentation_profile,
            &options,
            None,
            None,
        )
        .and_then(|result| {
            let stem = file
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audio".into());
            let output_path = self.output_dir.join(format!("{}_transcript.txt", stem));
            std::fs::write(&output_path, &result.text)?;
            Ok((result, output_path))
        });

        let duration_s = started.elapsed().as_secs_f64();
        match outcome {
            Ok((result, output_path)) => BatchResult {
                source_file: file.to_path_buf(),
                success: true,
                transcript_text: Some(result.text),
                output_path: Some(output_path),
                error: None,
                duration_s,
                audio_duration_s: result.duration_s,
            },
            Err(e) => {
                crate::error!("Failed to transcribe {}: {}", file.display(), e);
                BatchResult {
                    source_file: file.to_path_buf(),
                    success: false,
                    transcript_text: None,
                    output_path: None,
                    error: Some(e),
                    duration_s,
                    audio_duration_s: 0.0,
                }
            }
        }
    }
}

/// Concatenate successful transcripts in input order.
///
/// Each entry is optionally prefixed by `# <filename>`; entries are joined
/// by `separator` and the file always ends with a single trailing newline.
pub fn generate_combined_transcript(
    results: &[BatchResult],
    output_path: &Path,
    include_filenames: bool,
    separator: &str,
) -> Result<PathBuf> {
    let mut combined = String::new();
    let successful: Vec<&BatchResult> = results
        .iter()
        .filter(|r| r.success && r.transcript_text.is_some())
        .collect();

    for (i, result) in successful.iter().enumerate() {
        if include_filenames {
            let name = result
                .source_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            combined.push_str(&format!("# {}\n\n", name));
        }
        combined.push_str(result.transcript_text.as_deref().unwrap_or("").trim());
        if i < successful.len() - 1 {
            combined.push_str(separator);
        }
    }
    combined.push('\n');

    std::fs::write(output_path, combined)?;
    Ok(output_path.to_path_buf())
}

/// Pure reducer over batch results.
pub fn compute_batch_stats(results: &[BatchResult]) -> BatchStats {
    let successful = results.iter().filter(|r| r.success).count();
    BatchStats {
        total: results.len(),
        successful,
        failed: results.len() - successful,
        total_duration_s: results.iter().map(|r| r.duration_s).sum(),
        audio_duration_s: results.iter().map(|r| r.audio_duration_s).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, success: bool, text: Option<&str>) -> BatchResult {
        BatchResult {
            source_file: PathBuf::from(name),
            success,
            transcript_text: text.map(String::from),
            output_path: None,
            error: None,
            duration_s: 1.5,
            audio_duration_s: if success { 10.0 } else { 0.0 },
        }
    }

    #[test]
    fn daemon_mode_parses() {
        assert_eq!("always".parse::<DaemonMode>().unwrap(), DaemonMode::Always);
        assert_eq!("NEVER".parse::<DaemonMode>().unwrap(), DaemonMode::Never);
        assert!("sometimes".parse::<DaemonMode>().is_err());
    }

    #[test]
    fn stats_count_success_and_failure() {
        let results = vec![
            result("a.mp3", true, Some("text a")),
            result("b.mp3", false, None),
            result("c.mp3", true, Some("text c")),
        ];
        let stats = compute_batch_stats(&results);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.total_duration_s - 4.5).abs() < 1e-9);
        assert!((stats.audio_duration_s - 20.0).abs() < 1e-9);
    }

    #[test]
    fn combined_transcript_keeps_input_order_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("combined.txt");
        let results = vec![
            result("first.mp3", true, Some("alpha text")),
            result("broken.mp3", false, None),
            result("second.mp3", true, Some("beta text")),
        ];

        generate_combined_transcript(&results, &output, true, "\n\n").unwrap();
        let content = std::fs::read_to_string(&output).unwrap();

        assert!(content.contains("# first.mp3"));
        assert!(content.contains("alpha text"));
        assert!(content.contains("beta text"));
        assert!(!content.contains("broken.mp3"));
        let alpha_pos = content.find("alpha text").unwrap();
        let beta_pos = content.find("beta text").unwrap();
        assert!(alpha_pos < beta_pos, "input order preserved");
        assert!(content.ends_with('\n'), "trailing newline emitted");
        assert!(!content.ends_with("\n\n"), "exactly one trailing newline");
    }

    #[test]
    fn combined_transcript_without_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("combined.txt");
        let results = vec![result("a.mp3", true, Some("  padded text  "))];

        generate_combined_transcript(&results, &output, false, "\n\n").unwrap();
        let content = std::fs::read_to_string(&output).unwrap();
        assert_eq!(content, "padded text\n");
    }

    #[test]
    fn batch_with_missing_files_reports_every_file() {
        // Files do not exist: every workflow run fails at source
        // resolution, but continue-on-error keeps the batch going.
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            dir.path().join("missing1.wav"),
            dir.path().join("missing2.wav"),
            dir.path().join("missing3.wav"),
        ];
        let runner = BatchRunner::new(
            files.clone(),
            dir.path().join("out"),
            crate::config::EngineProfile::new(
                crate::config::EngineKind::WhisperTurbo,
                crate::config::EngineConfig::new(crate::config::EngineKind::WhisperTurbo, None).unwrap(),
                crate::config::TranscriptionOptions::default(),
            ),
            SegmentationProfile::default(),
        );
        let mut runner = runner;
        runner.daemon_mode = DaemonMode::Never;

        let results = runner.run(None).unwrap();
        assert_eq!(results.len(), 3, "one result per input with continue_on_error");
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(compute_batch_stats(&results).failed, 3);
    }

    #[test]
    fn batch_stops_early_without_continue_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![dir.path().join("missing1.wav"), dir.path().join("missing2.wav")];
        let mut runner = BatchRunner::new(
            files,
            dir.path().join("out"),
            crate::config::EngineProfile::new(
                crate::config::EngineKind::WhisperTurbo,
                crate::config::EngineConfig::new(crate::config::EngineKind::WhisperTurbo, None).unwrap(),
                crate::config::TranscriptionOptions::default(),
            ),
            SegmentationProfile::default(),
        );
        runner.daemon_mode = DaemonMode::Never;
        runner.continue_on_error = false;

        let results = runner.run(None).unwrap();
        assert_eq!(results.len(), 1, "runner stops after first failure");
    }

    #[test]
    fn parallel_batch_reports_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..4).map(|i| dir.path().join(format!("m{}.wav", i))).collect();
        let mut runner = BatchRunner::new(
            files,
            dir.path().join("out"),
            crate::config::EngineProfile::new(
                crate::config::EngineKind::WhisperTurbo,
                crate::config::EngineConfig::new(crate::config::EngineKind::WhisperTurbo, None).unwrap(),
                crate::config::TranscriptionOptions::default(),
            ),
            SegmentationProfile::default(),
        );
        runner.daemon_mode = DaemonMode::Never;
        runner.parallel = 2;

        let results = runner.run(None).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| !r.success));
    }
}
