//! The canonical decode → VAD → condense → transcribe → refine workflow.
//!
//! File-first: every source resolves to a local path, a single engine
//! instance is reused through `EngineWorker`, and intermediates are
//! cleaned up on all exit paths according to the artifact policy.

use std::path::{Path, PathBuf};

use crate::audio::condenser::Condenser;
use crate::audio::decoder::FfmpegDecoder;
use crate::audio::preprocess::{AudioPreprocessor, PreprocessingConfig};
use crate::audio::vad::{SpeechDetector, save_timestamps};
use crate::audio::wav::wav_duration;
use crate::config::{ArtifactConfig, EngineProfile, SegmentationProfile};
use crate::domain::{TranscriptSegment, TranscriptionResult};
use crate::engine::EngineWorker;
use crate::error::Result;
use crate::progress::{NullProgressTracker, ProgressTracker, TranscriptionProgress};
use crate::sources::AudioSource;

/// Per-run knobs for the workflow.
pub struct WorkflowOptions {
    /// Run the refinement pass over the joined transcript
    pub refine: bool,
    pub refine_instructions: Option<String>,
    /// CLI override; `None` follows `artifact_config.cleanup_intermediates`
    pub keep_intermediates: Option<bool>,
    pub artifact_config: Option<ArtifactConfig>,
    /// Work under this directory instead of the artifact default
    pub intermediate_dir: Option<PathBuf>,
    /// Pre-condensed chunk: skips decode, VAD, and condense entirely
    pub condensed_path: Option<PathBuf>,
    /// Optional preprocessing applied before decode
    pub preprocess: Option<PreprocessingConfig>,
    /// Let an internally-created worker probe the warm daemon
    pub use_daemon: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            refine: false,
            refine_instructions: None,
            keep_intermediates: None,
            artifact_config: None,
            intermediate_dir: None,
            condensed_path: None,
            preprocess: None,
            use_daemon: true,
        }
    }
}

/// Shift all segments in a group by `offset` seconds.
fn offset_segments(segments: Vec<TranscriptSegment>, offset: f64) -> Vec<TranscriptSegment> {
    if offset == 0.0 {
        return segments;
    }
    segments.into_iter().map(|s| s.offset_by(offset)).collect()
}

/// Stitch per-chunk segment groups onto the original timeline.
///
/// `offset_0 = 0`, `offset_{k+1} = offset_k + duration_of(chunk_k)`. Ids
/// are re-assigned sequentially so they stay unique within the result.
pub fn stitch_segments(
    groups: Vec<Vec<TranscriptSegment>>,
    chunk_durations: &[f64],
) -> Vec<TranscriptSegment> {
    let mut all = Vec::new();
    let mut offset = 0.0;
    for (group, duration) in groups.into_iter().zip(chunk_durations.iter()) {
        all.extend(offset_segments(group, offset));
        offset += duration;
    }
    for (i, segment) in all.iter_mut().enumerate() {
        segment.id = format!("segment-{}", i);
    }
    all
}

/// End-to-end transcription of a single source.
///
/// Steps run sequentially; failure at any step aborts with that step's
/// error, except refinement, whose failure is demoted to a warning.
pub fn transcribe_file_workflow(
    source: &dyn AudioSource,
    engine_profile: &EngineProfile,
    segmentation_profile: &SegmentationProfile,
    options: &WorkflowOptions,
    engine_worker: Option<&mut EngineWorker>,
    progress: Option<&dyn ProgressTracker>,
) -> Result<TranscriptionResult> {
    let artifact_cfg = options.artifact_config.clone().unwrap_or_default();
    let should_cleanup = match options.keep_intermediates {
        Some(keep) => !keep,
        None => artifact_cfg.cleanup_intermediates,
    };

    let work_dir = options
        .intermediate_dir
        .clone()
        .unwrap_or_else(|| artifact_cfg.output_directory.clone());
    let created_work_dir = !work_dir.exists();
    std::fs::create_dir_all(&work_dir)?;

    let null_tracker = NullProgressTracker;
    let tracker: &dyn ProgressTracker = progress.unwrap_or(&null_tracker);
    let stage = TranscriptionProgress::new(tracker);

    let mut owned_worker;
    let worker: &mut EngineWorker = match engine_worker {
        Some(worker) => worker,
        None => {
            let mut fresh = EngineWorker::new(engine_profile.clone());
            if !options.use_daemon {
                fresh = fresh.without_daemon();
            }
            owned_worker = fresh;
            &mut owned_worker
        }
    };

    let mut cleanup_paths: Vec<PathBuf> = Vec::new();
    let outcome = run_pipeline(
        source,
        engine_profile,
        segmentation_profile,
        options,
        &artifact_cfg,
        &work_dir,
        worker,
        &stage,
        &mut cleanup_paths,
    );

    if should_cleanup && (outcome.is_ok() || !artifact_cfg.keep_on_error) {
        for path in &cleanup_paths {
            let _ = std::fs::remove_file(path);
        }
        if created_work_dir {
            let _ = std::fs::remove_dir(&work_dir);
        }
    }

    outcome
}

#[allow(clippy::too_many_arguments)]
fn run_pipeline(
    source: &dyn AudioSource,
    engine_profile: &EngineProfile,
    segmentation_profile: &SegmentationProfile,
    options: &WorkflowOptions,
    artifact_cfg: &ArtifactConfig,
    work_dir: &Path,
    worker: &mut EngineWorker,
    stage: &TranscriptionProgress<'_>,
    cleanup_paths: &mut Vec<PathBuf>,
) -> Result<TranscriptionResult> {
    let mut target_audio = source.resolve_to_path(work_dir)?;
    let input_name = target_audio
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    let input_stem = target_audio
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    let artifact = |step: &str, ext: &str| -> PathBuf {
        work_dir.join(artifact_cfg.artifact_name(&input_name, &input_stem, step, ext))
    };

    if let Some(preprocess_cfg) = &options.preprocess {
        let preprocessor = AudioPreprocessor::new(preprocess_cfg.clone());
        if preprocessor.needs_preprocessing() {
            stage.start_preprocess();
            let preprocessed = artifact("preprocessed", "wav");
            target_audio = preprocessor.preprocess(&target_audio, &preprocessed)?;
            cleanup_paths.push(preprocessed);
            stage.complete_preprocess();
        }
    }

    let condensed_paths: Vec<PathBuf> = match &options.condensed_path {
        Some(path) => vec![path.clone()],
        None => {
            stage.start_decode();
            let decoded = FfmpegDecoder::new().decode_to_wav(&target_audio, &artifact("decoded", "wav"))?;
            cleanup_paths.push(decoded.clone());
            stage.complete_decode();

            stage.start_vad();
            let detector = SpeechDetector::new(segmentation_profile.sample_rate);
            let spans = detector.detect(&decoded, segmentation_profile)?;
            let timestamps_path = artifact("decoded_vad_timestamps", "json");
            save_timestamps(&spans, &timestamps_path)?;
            cleanup_paths.push(timestamps_path);
            stage.complete_vad(spans.len());

            stage.start_condense();
            let chunks = Condenser::new().condense(&spans, &decoded, segmentation_profile, Some(work_dir))?;
            cleanup_paths.extend(chunks.iter().cloned());
            stage.complete_condense(chunks.len());

            chunks
        }
    };

    let chunk_durations: Vec<f64> = condensed_paths
        .iter()
        .map(|p| wav_duration(p))
        .collect::<Result<_>>()?;

    stage.start_transcribe(condensed_paths.len());
    let groups = worker.transcribe_batch(&condensed_paths)?;
    stage.complete_transcribe();

    let all_segments = stitch_segments(groups, &chunk_durations);

    let mut warnings: Vec<String> = worker.warnings().to_vec();
    let metadata = worker.metadata()?;
    let mut result = TranscriptionResult::from_segments(
        all_segments,
        &metadata,
        engine_profile.kind.as_str(),
        Vec::new(),
    );

    if options.refine && !result.text.is_empty() {
        stage.start_refine();
        match worker.refine_text(&result.text, options.refine_instructions.as_deref()) {
            Ok(refined) => result.text = refined,
            Err(e) => warnings.push(format!("Refinement failed: {}", e)),
        }
        stage.complete_refine();
    }

    result.warnings = warnings;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::write_wav;
    use crate::config::{EngineConfig, EngineKind, TranscriptionOptions};
    use crate::domain::EngineMetadata;
    use crate::engine::TranscriptionEngine;
    use crate::error::SottoError;
    use crate::refine::Refiner;
    use crate::sources::FileSource;

    fn profile() -> EngineProfile {
        EngineProfile::new(
            EngineKind::WhisperTurbo,
            EngineConfig::new(EngineKind::WhisperTurbo, None).unwrap(),
            TranscriptionOptions::default(),
        )
    }

    fn seg(id: &str, start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(id, start, end, text)
    }

    struct PerFileEngine {
        texts: Vec<&'static str>,
        next: usize,
    }

    impl TranscriptionEngine for PerFileEngine {
        fn transcribe_file(
            &mut self,
            audio_path: &Path,
            _options: &TranscriptionOptions,
        ) -> crate::error::Result<Vec<TranscriptSegment>> {
            let text = self.texts.get(self.next).copied().unwrap_or("");
            self.next += 1;
            let duration = wav_duration(audio_path).unwrap_or(0.0);
            Ok(vec![seg("segment-0", 0.0, duration, text)])
        }

        fn metadata(&self) -> EngineMetadata {
            EngineMetadata {
                model_name: "test-model".into(),
                device: "cpu".into(),
                precision: "fp32".into(),
            }
        }
    }

    fn write_chunk(dir: &Path, name: &str, seconds: f64) -> PathBuf {
        let path = dir.join(name);
        let samples = vec![0i16; (seconds * 16_000.0) as usize];
        write_wav(&path, &samples, 16_000).unwrap();
        path
    }

    #[test]
    fn stitching_applies_cumulative_offsets() {
        let groups = vec![
            vec![seg("segment-0", 0.0, 30.0, "first")],
            vec![seg("segment-0", 0.0, 27.0, "second")],
            vec![seg("segment-0", 0.0, 27.0, "third")],
        ];
        let stitched = stitch_segments(groups, &[30.0, 27.0, 27.0]);
        assert_eq!(stitched.len(), 3);
        assert_eq!(stitched[1].start_s, 30.0);
        assert_eq!(stitched[1].end_s, 57.0);
        assert_eq!(stitched[2].start_s, 57.0);
        assert_eq!(stitched[2].end_s, 84.0);
        // Ids are unique after stitching
        let ids: std::collections::HashSet<_> = stitched.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn stitched_segments_are_monotonic() {
        let groups = vec![
            vec![seg("a", 0.0, 10.0, "x"), seg("b", 10.0, 20.0, "y")],
            vec![seg("a", 0.0, 5.0, "z")],
        ];
        let stitched = stitch_segments(groups, &[20.0, 5.0]);
        for pair in stitched.windows(2) {
            assert!(pair[1].start_s >= pair[0].start_s);
            assert!(pair[0].end_s >= pair[0].start_s);
        }
    }

    #[test]
    fn single_daemon_group_gets_zero_offset() {
        // A daemon batch comes back as one group; only offset 0 applies.
        let groups = vec![vec![seg("a", 0.0, 3.0, "all"), seg("b", 3.0, 6.0, "of it")]];
        let stitched = stitch_segments(groups, &[3.0, 3.0]);
        assert_eq!(stitched[0].start_s, 0.0);
        assert_eq!(stitched[1].end_s, 6.0);
    }

    #[test]
    fn condensed_path_skips_decode_and_produces_result() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = write_chunk(dir.path(), "chunk.wav", 3.1);

        let mut worker = EngineWorker::with_engine(
            profile(),
            Box::new(PerFileEngine {
                texts: vec!["hello world"],
                next: 0,
            }),
        )
        .without_daemon();

        let options = WorkflowOptions {
            condensed_path: Some(chunk),
            intermediate_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = transcribe_file_workflow(
            &FileSource::new(dir.path().join("chunk.wav")),
            &profile(),
            &SegmentationProfile::default(),
            &options,
            Some(&mut worker),
            None,
        )
        .unwrap();

        assert_eq!(result.text, "hello world");
        assert_eq!(result.segments.len(), 1);
        assert!((result.duration_s - 3.1).abs() < 0.01);
        assert_eq!(result.engine, "whisper_turbo");
        assert_eq!(result.model_name, "test-model");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn refinement_failure_is_demoted_to_warning() {
        struct Failing;
        impl Refiner for Failing {
            fn refine(&self, _t: &str, _i: Option<&str>) -> crate::error::Result<String> {
                Err(SottoError::refinement_output_invalid(10, 0, "prompt leakage"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let chunk = write_chunk(dir.path(), "chunk.wav", 2.0);

        let mut worker = EngineWorker::with_engine(
            profile(),
            Box::new(PerFileEngine {
                texts: vec!["raw transcript text"],
                next: 0,
            }),
        )
        .without_daemon()
        .with_refiner(Box::new(Failing));

        let options = WorkflowOptions {
            refine: true,
            condensed_path: Some(chunk.clone()),
            intermediate_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = transcribe_file_workflow(
            &FileSource::new(&chunk),
            &profile(),
            &SegmentationProfile::default(),
            &options,
            Some(&mut worker),
            None,
        )
        .unwrap();

        // Raw text kept, failure recorded as a warning
        assert_eq!(result.text, "raw transcript text");
        assert!(result.warnings.iter().any(|w| w.contains("Refinement failed")));
    }

    #[test]
    fn refinement_success_replaces_text() {
        struct Upper;
        impl Refiner for Upper {
            fn refine(&self, t: &str, _i: Option<&str>) -> crate::error::Result<String> {
                Ok(t.to_uppercase())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let chunk = write_chunk(dir.path(), "chunk.wav", 2.0);

        let mut worker = EngineWorker::with_engine(
            profile(),
            Box::new(PerFileEngine {
                texts: vec!["quiet words"],
                next: 0,
            }),
        )
        .without_daemon()
        .with_refiner(Box::new(Upper));

        let options = WorkflowOptions {
            refine: true,
            condensed_path: Some(chunk.clone()),
            intermediate_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let result = transcribe_file_workflow(
            &FileSource::new(&chunk),
            &profile(),
            &SegmentationProfile::default(),
            &options,
            Some(&mut worker),
            None,
        )
        .unwrap();
        assert_eq!(result.text, "QUIET WORDS");
    }

    #[test]
    fn multi_chunk_offsets_cover_original_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_chunk(dir.path(), "part1.wav", 30.0);
        let _b = write_chunk(dir.path(), "part2.wav", 27.0);

        let mut worker = EngineWorker::with_engine(
            profile(),
            Box::new(PerFileEngine {
                texts: vec!["one", "two"],
                next: 0,
            }),
        )
        .without_daemon();

        // Drive the batch directly the way the workflow does
        let paths = vec![a, dir.path().join("part2.wav")];
        let groups = worker.transcribe_batch(&paths).unwrap();
        let durations: Vec<f64> = paths.iter().map(|p| wav_duration(p).unwrap()).collect();
        let stitched = stitch_segments(groups, &durations);

        assert_eq!(stitched.len(), 2);
        assert!((stitched[1].start_s - 30.0).abs() < 1e-6);
        assert!((stitched[1].end_s - 57.0).abs() < 1e-6);
    }

    #[test]
    fn created_work_dir_is_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = write_chunk(dir.path(), "chunk.wav", 1.0);
        let work_dir = dir.path().join("scratch");

        let mut worker = EngineWorker::with_engine(
            profile(),
            Box::new(PerFileEngine {
                texts: vec!["t"],
                next: 0,
            }),
        )
        .without_daemon();

        let options = WorkflowOptions {
            condensed_path: Some(chunk.clone()),
            intermediate_dir: Some(work_dir.clone()),
            ..Default::default()
        };
        transcribe_file_workflow(
            &FileSource::new(&chunk),
            &profile(),
            &SegmentationProfile::default(),
            &options,
            Some(&mut worker),
            None,
        )
        .unwrap();

        assert!(!work_dir.exists(), "orchestrator-created work dir must be removed");
        assert!(chunk.exists(), "caller-provided chunk must not be deleted");
    }
}
