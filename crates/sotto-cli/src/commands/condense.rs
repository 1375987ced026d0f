use std::path::PathBuf;

use sotto_core::audio::vad::load_timestamps;
use sotto_core::audio::wav::wav_duration;
use sotto_core::audio::{Condenser, FfmpegDecoder, SpeechDetector};
use sotto_core::Result;

use crate::args::SegmentationOptions;
use crate::commands::build_segmentation_profile;

pub fn run(
    input: PathBuf,
    timestamps: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    single: Option<PathBuf>,
    segmentation: SegmentationOptions,
) -> Result<()> {
    let profile = build_segmentation_profile(&segmentation)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".into());
    let work_dir = tempfile::tempdir()?;
    let decoded = FfmpegDecoder::new()
        .decode_to_wav(&input, &work_dir.path().join(format!("{}_decoded.wav", stem)))?;

    let spans = match timestamps {
        Some(path) => load_timestamps(&path)?,
        None => SpeechDetector::new(profile.sample_rate).detect(&decoded, &profile)?,
    };

    let condenser = Condenser::new();
    let outputs = match single {
        Some(target) => vec![condenser.condense_to_single(&spans, &decoded, &target)?],
        None => {
            let dir = output_dir.unwrap_or_else(|| {
                input.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
            });
            condenser.condense(&spans, &decoded, &profile, Some(&dir))?
        }
    };

    println!("{} chunk(s):", outputs.len());
    for path in &outputs {
        let duration = wav_duration(path)?;
        println!("  {} ({:.1}s)", path.display(), duration);
    }
    Ok(())
}
