use std::path::PathBuf;

use sotto_core::audio::vad::save_timestamps;
use sotto_core::audio::{FfmpegDecoder, SpeechDetector};
use sotto_core::Result;

use crate::args::SegmentationOptions;
use crate::commands::build_segmentation_profile;

pub fn run(input: PathBuf, output: Option<PathBuf>, segmentation: SegmentationOptions) -> Result<()> {
    let profile = build_segmentation_profile(&segmentation)?;

    // The detector expects canonical PCM; decode into a scratch file.
    let work_dir = tempfile::tempdir()?;
    let decoded = FfmpegDecoder::new().decode_to_wav(&input, &work_dir.path().join("decoded.wav"))?;

    let spans = SpeechDetector::new(profile.sample_rate).detect(&decoded, &profile)?;

    println!("{} speech spans:", spans.len());
    for span in &spans {
        println!("  {:8.2}s - {:8.2}s  ({:.2}s)", span.start, span.end, span.duration());
    }
    let total: f64 = spans.iter().map(|s| s.duration()).sum();
    println!("Total speech: {:.1}s", total);

    if let Some(output) = output {
        save_timestamps(&spans, &output)?;
        println!("Timestamps saved to {}", output.display());
    }
    Ok(())
}
