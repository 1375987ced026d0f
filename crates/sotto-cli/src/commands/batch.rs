use std::path::PathBuf;

use sotto_core::audio::PreprocessingConfig;
use sotto_core::batch::{BatchRunner, compute_batch_stats, generate_combined_transcript};
use sotto_core::progress::ProgressTracker;
use sotto_core::Result;

use crate::args::{EngineOptions, SegmentationOptions};
use crate::commands::{build_engine_profile, build_segmentation_profile};
use crate::ui::TermProgressTracker;

#[allow(clippy::too_many_arguments)]
pub fn run(
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    parallel: usize,
    fail_fast: bool,
    daemon_mode: String,
    combined: Option<PathBuf>,
    preprocess: String,
    refine: bool,
    engine: EngineOptions,
    segmentation: SegmentationOptions,
) -> Result<()> {
    let engine_profile = build_engine_profile(&engine)?;
    let segmentation_profile = build_segmentation_profile(&segmentation)?;
    let preprocess_config = PreprocessingConfig::from_preset(&preprocess)?;

    let mut runner = BatchRunner::new(files, output_dir, engine_profile, segmentation_profile);
    runner.parallel = parallel;
    runner.continue_on_error = !fail_fast;
    runner.daemon_mode = daemon_mode.parse()?;
    runner.refine = refine;
    if preprocess_config.needs_preprocessing() {
        runner.preprocess = Some(preprocess_config);
    }

    let tracker = TermProgressTracker::new();
    let results = runner.run(Some(&tracker))?;
    tracker.finish();

    let stats = compute_batch_stats(&results);
    println!(
        "\n{} files: {} succeeded, {} failed ({:.1}s total, {:.1}s of audio)",
        stats.total, stats.successful, stats.failed, stats.total_duration_s, stats.audio_duration_s
    );

    if let Some(combined_path) = combined {
        generate_combined_transcript(&results, &combined_path, true, "\n\n")?;
        println!("Combined transcript: {}", combined_path.display());
    }

    if stats.failed > 0 {
        for result in results.iter().filter(|r| !r.success) {
            if let Some(error) = &result.error {
                eprintln!("  {} failed: {}", result.source_file.display(), error);
            }
        }
    }
    Ok(())
}
