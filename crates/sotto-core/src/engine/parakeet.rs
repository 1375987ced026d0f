//! Local Parakeet engine via transcribe-rs.
//!
//! Requires a Parakeet ONNX model directory. Parakeet is the daemon's
//! default resident model: fast batch throughput and stable memory use.

use std::path::{Path, PathBuf};

use transcribe_rs::TranscriptionEngine as _;
use transcribe_rs::engines::parakeet::{
    ParakeetEngine as ParakeetBackend, ParakeetInferenceParams, ParakeetModelParams,
    TimestampGranularity,
};

use crate::config::{EngineConfig, TranscriptionOptions};
use crate::domain::{EngineMetadata, TranscriptSegment};
use crate::error::{Result, SottoError};

use super::TranscriptionEngine;

pub struct ParakeetEngine {
    config: EngineConfig,
    model_dir: PathBuf,
    backend: Option<ParakeetBackend>,
}

impl ParakeetEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let model_dir = resolve_model_dir(&config);
        Ok(Self {
            config,
            model_dir,
            backend: None,
        })
    }

    fn ensure_loaded(&mut self) -> Result<&mut ParakeetBackend> {
        if self.backend.is_none() {
            if !self.model_dir.exists() {
                return Err(SottoError::missing_model("Parakeet", &self.model_dir));
            }
            crate::verbose!("Loading Parakeet model: {}", self.model_dir.display());
            let mut backend = ParakeetBackend::new();
            // Model dirs ship int8-quantized ONNX weights
            backend
                .load_model_with_params(&self.model_dir, ParakeetModelParams::int8())
                .map_err(|e| {
                    SottoError::engine(format!("Failed to load Parakeet model: {}", e))
                })?;
            self.backend = Some(backend);
        }
        Ok(self.backend.as_mut().expect("backend just set"))
    }
}

impl TranscriptionEngine for ParakeetEngine {
    fn transcribe_file(
        &mut self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Vec<TranscriptSegment>> {
        let decoded = crate::audio::wav::read_decoded(audio_path)?;
        let samples = crate::audio::wav::samples_to_f32(&decoded.samples);
        let params = ParakeetInferenceParams {
            timestamp_granularity: TimestampGranularity::Segment,
        };

        let backend = self.ensure_loaded()?;
        let result = backend
            .transcribe_samples(samples, Some(params))
            .map_err(|e| SottoError::engine_inference_failed("parakeet", audio_path, e))?;

        let text = result.text.trim().to_string();
        let segment = TranscriptSegment {
            id: "segment-0".to_string(),
            start_s: 0.0,
            end_s: decoded.duration_s,
            raw_text: text,
            refined_text: None,
            language: Some(options.language_or_default().to_string()),
            confidence: None,
        };
        Ok(vec![segment])
    }

    fn preload(&mut self) -> Result<()> {
        self.ensure_loaded().map(|_| ())
    }

    fn metadata(&self) -> EngineMetadata {
        EngineMetadata {
            model_name: self.config.model_name.clone(),
            device: self.config.device.to_string(),
            precision: self.config.compute_type.to_string(),
        }
    }
}

/// Where the ONNX model directory for this config lives.
fn resolve_model_dir(config: &EngineConfig) -> PathBuf {
    let base = config.model_cache_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sotto")
            .join("models")
    });
    base.join(&config.model_name)
}
