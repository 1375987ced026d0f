use std::path::PathBuf;

use sotto_core::audio::FfmpegDecoder;
use sotto_core::audio::probe::validate_audio_file;
use sotto_core::Result;

pub fn run(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let info = validate_audio_file(&input)?;
    println!(
        "{}: {:.1}s, {} Hz, {} ch, {} ({:.1} MB)",
        input.display(),
        info.duration_s,
        info.sample_rate,
        info.channels,
        info.codec,
        info.file_size_mb
    );

    let output = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".into());
        input.with_file_name(format!("{}_decoded.wav", stem))
    });

    let decoded = FfmpegDecoder::new().decode_to_wav(&input, &output)?;
    println!("Decoded to {}", decoded.display());
    Ok(())
}
