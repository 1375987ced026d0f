use std::path::PathBuf;
use std::time::Duration;

use sotto_core::Result;

#[cfg(feature = "microphone")]
pub fn run(duration: Duration, output: PathBuf) -> Result<()> {
    use sotto_core::sources::{AudioSource, MicSource};

    println!("Recording for {}s...", duration.as_secs());
    let work_dir = tempfile::tempdir()?;
    let source = MicSource::default_device(duration)?;
    let captured = source.resolve_to_path(work_dir.path())?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&captured, &output)?;
    println!("Saved recording to {}", output.display());
    Ok(())
}

#[cfg(not(feature = "microphone"))]
pub fn run(_duration: Duration, _output: PathBuf) -> Result<()> {
    use sotto_core::error::{ErrorDetails, SottoError};
    Err(SottoError::Dependency(
        ErrorDetails::new("Recording requires the 'microphone' feature")
            .with_suggestion("Rebuild with --features microphone"),
    ))
}
