// Domain modules (organized by concern)
pub mod audio;
pub mod batch;
pub mod config;
pub mod domain;
pub mod engine;
pub mod refine;
pub mod server;
pub mod sinks;
pub mod sources;
pub mod workflow;

// Cross-cutting concerns
pub mod error;
#[cfg(feature = "history")]
pub mod history;
pub mod progress;
pub mod verbose;

// Re-export audio types
pub use audio::{
    AudioPreprocessor, Condenser, FfmpegDecoder, PreprocessingConfig, SpeechDetector,
    validate_audio_file,
};

// Re-export configuration types
pub use config::{
    ArtifactConfig, ComputeType, Device, EngineConfig, EngineKind, EngineProfile,
    SegmentationProfile, TranscriptionOptions, engine_presets, get_engine_preset,
    get_segmentation_preset, segmentation_presets,
};

// Re-export domain types
pub use domain::{
    AudioFileInfo, DecodedAudio, EngineMetadata, SpeechSpan, TranscriptSegment,
    TranscriptionResult,
};

// Re-export engine types
pub use engine::{EngineWorker, TranscriptionEngine, build_engine};

// Re-export refinement types
pub use refine::{NullRefiner, OllamaRefiner, RefinementMode, Refiner, extract_assistant_response};

// Re-export server types
pub use server::{DaemonClient, DaemonConfig, DaemonManager, get_daemon_pid, run_daemon};

// Re-export pipeline types
pub use batch::{
    BatchResult, BatchRunner, BatchStats, DaemonMode, compute_batch_stats,
    generate_combined_transcript,
};
pub use progress::{
    CallbackProgressTracker, NullProgressTracker, ProgressTracker, ProgressUpdate,
    TranscriptionProgress,
};
pub use sinks::{CompositeSink, FileSink, RefiningSink, Sink, StdoutSink};
pub use sources::{AudioSource, FileSource, MemorySource, MicSource};
pub use workflow::{WorkflowOptions, transcribe_file_workflow};

pub use error::{Result, SottoError};
pub use verbose::set_verbose;
