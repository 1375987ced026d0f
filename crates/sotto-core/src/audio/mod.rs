//! Audio primitives: decode, probe, VAD, condense, preprocess, capture.

pub mod condenser;
pub mod decoder;
pub mod preprocess;
pub mod probe;
pub mod recorder;
pub mod vad;
pub mod wav;

pub use condenser::{Condenser, plan_chunks};
pub use decoder::FfmpegDecoder;
pub use preprocess::{AudioPreprocessor, PreprocessingConfig};
pub use probe::validate_audio_file;
pub use recorder::{Recorder, Recording};
pub use vad::SpeechDetector;
pub use wav::{read_decoded, wav_duration, write_wav};
