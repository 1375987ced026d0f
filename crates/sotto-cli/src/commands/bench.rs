use std::path::PathBuf;
use std::time::Instant;

use sotto_core::audio::probe::validate_audio_file;
use sotto_core::engine::EngineWorker;
use sotto_core::sources::FileSource;
use sotto_core::workflow::{WorkflowOptions, transcribe_file_workflow};
use sotto_core::Result;

use crate::args::{EngineOptions, SegmentationOptions};
use crate::commands::{build_engine_profile, build_segmentation_profile};

/// Timed transcription runs reporting the real-time factor
/// (wall clock / audio duration; lower is faster).
pub fn run(
    input: PathBuf,
    runs: usize,
    engine: EngineOptions,
    segmentation: SegmentationOptions,
) -> Result<()> {
    let engine_profile = build_engine_profile(&engine)?;
    let segmentation_profile = build_segmentation_profile(&segmentation)?;
    let info = validate_audio_file(&input)?;

    println!(
        "Benchmarking {} ({:.1}s of audio, engine {})",
        input.display(),
        info.duration_s,
        engine_profile.kind
    );

    // One warm worker across runs so model load is paid once
    let mut worker = EngineWorker::new(engine_profile.clone());
    let mut wall_times = Vec::with_capacity(runs.max(1));

    for i in 0..runs.max(1) {
        let started = Instant::now();
        let result = transcribe_file_workflow(
            &FileSource::new(&input),
            &engine_profile,
            &segmentation_profile,
            &WorkflowOptions::default(),
            Some(&mut worker),
            None,
        )?;
        let elapsed = started.elapsed().as_secs_f64();
        wall_times.push(elapsed);
        println!(
            "  run {}: {:.2}s wall, RTF {:.3}, {} segments",
            i + 1,
            elapsed,
            elapsed / info.duration_s,
            result.segments.len()
        );
    }

    let best = wall_times.iter().cloned().fold(f64::INFINITY, f64::min);
    let mean: f64 = wall_times.iter().sum::<f64>() / wall_times.len() as f64;
    println!(
        "Best: {:.2}s (RTF {:.3}), mean: {:.2}s (RTF {:.3})",
        best,
        best / info.duration_s,
        mean,
        mean / info.duration_s
    );
    Ok(())
}
