//! Transcription engines.
//!
//! Engines implement the `TranscriptionEngine` trait; `build_engine`
//! dispatches an `EngineKind` to the matching constructor. The actual
//! model inference is delegated to transcribe-rs; engines here own model
//! residency, path resolution, and segment assembly.

use std::path::{Path, PathBuf};

use crate::config::{EngineConfig, EngineKind, TranscriptionOptions};
use crate::domain::{EngineMetadata, TranscriptSegment};
use crate::error::Result;

pub mod registry;
pub mod worker;

#[cfg(feature = "local-transcription")]
mod parakeet;
#[cfg(feature = "local-transcription")]
mod whisper;

#[cfg(feature = "local-transcription")]
pub use parakeet::ParakeetEngine;
#[cfg(feature = "local-transcription")]
pub use whisper::WhisperTurboEngine;
pub use worker::EngineWorker;

/// An ASR model wrapper that turns a chunk file into transcript segments.
pub trait TranscriptionEngine: Send {
    /// Transcribe a single audio file into segments on the file's own
    /// timeline (starting at 0).
    fn transcribe_file(
        &mut self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Vec<TranscriptSegment>>;

    /// Transcribe multiple files. The default loops `transcribe_file`;
    /// engines with a native batch mode override this.
    fn transcribe_files_batch(
        &mut self,
        audio_paths: &[PathBuf],
        options: &TranscriptionOptions,
    ) -> Result<Vec<Vec<TranscriptSegment>>> {
        audio_paths
            .iter()
            .map(|path| self.transcribe_file(path, options))
            .collect()
    }

    /// Load the model now instead of on first use. The daemon calls this
    /// at startup so health probes can report residency.
    fn preload(&mut self) -> Result<()> {
        Ok(())
    }

    /// Identity of the loaded (or to-be-loaded) model.
    fn metadata(&self) -> EngineMetadata;
}

#[cfg(feature = "local-transcription")]
type EngineBuilder = fn(EngineConfig) -> Result<Box<dyn TranscriptionEngine>>;

/// Dispatch table from engine kind to constructor.
#[cfg(feature = "local-transcription")]
const ENGINE_BUILDERS: &[(EngineKind, EngineBuilder)] = &[
    (EngineKind::WhisperTurbo, |config| {
        Ok(Box::new(WhisperTurboEngine::new(config)?))
    }),
    (EngineKind::Parakeet, |config| {
        Ok(Box::new(ParakeetEngine::new(config)?))
    }),
];

/// Build an engine for `kind` from the dispatch table.
#[cfg(feature = "local-transcription")]
pub fn build_engine(kind: EngineKind, config: EngineConfig) -> Result<Box<dyn TranscriptionEngine>> {
    let (_, builder) = ENGINE_BUILDERS
        .iter()
        .find(|(k, _)| *k == kind)
        .ok_or_else(|| {
            crate::error::SottoError::config(format!("Unsupported engine kind: {}", kind))
        })?;
    builder(config)
}

#[cfg(not(feature = "local-transcription"))]
pub fn build_engine(kind: EngineKind, _config: EngineConfig) -> Result<Box<dyn TranscriptionEngine>> {
    Err(crate::error::SottoError::Dependency(
        crate::error::ErrorDetails::new(format!(
            "Engine '{}' requires the 'local-transcription' feature",
            kind
        ))
        .with_suggestion("Rebuild with --features local-transcription"),
    ))
}
