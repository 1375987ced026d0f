//! Local Whisper engine via transcribe-rs.
//!
//! Requires a whisper.cpp ggml checkpoint (e.g. ggml-turbo.bin) under the
//! model cache directory. The model is loaded lazily on first use.

use std::path::{Path, PathBuf};

use transcribe_rs::TranscriptionEngine as _;
use transcribe_rs::engines::whisper::{WhisperEngine as WhisperBackend, WhisperInferenceParams};

use crate::config::{EngineConfig, TranscriptionOptions};
use crate::domain::{EngineMetadata, TranscriptSegment};
use crate::error::{Result, SottoError};

use super::TranscriptionEngine;

pub struct WhisperTurboEngine {
    config: EngineConfig,
    model_path: PathBuf,
    backend: Option<WhisperBackend>,
}

impl WhisperTurboEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let model_path = resolve_model_path(&config);
        Ok(Self {
            config,
            model_path,
            backend: None,
        })
    }

    fn ensure_loaded(&mut self) -> Result<&mut WhisperBackend> {
        if self.backend.is_none() {
            if !self.model_path.exists() {
                return Err(SottoError::missing_model("Whisper", &self.model_path));
            }
            crate::verbose!("Loading whisper model from: {}", self.model_path.display());
            let mut backend = WhisperBackend::new();
            backend.load_model(&self.model_path).map_err(|e| {
                SottoError::engine(format!("Failed to load whisper model: {}", e))
            })?;
            self.backend = Some(backend);
        }
        Ok(self.backend.as_mut().expect("backend just set"))
    }

    fn inference_params(options: &TranscriptionOptions) -> WhisperInferenceParams {
        WhisperInferenceParams {
            language: options.language.clone(),
            translate: false,
            print_special: false,
            print_progress: false,
            print_realtime: false,
            print_timestamps: false,
            suppress_blank: true,
            suppress_non_speech_tokens: true,
            no_speech_thold: 0.2,
            initial_prompt: options.prompt.clone(),
        }
    }
}

impl TranscriptionEngine for WhisperTurboEngine {
    fn transcribe_file(
        &mut self,
        audio_path: &Path,
        options: &TranscriptionOptions,
    ) -> Result<Vec<TranscriptSegment>> {
        let decoded = crate::audio::wav::read_decoded(audio_path)?;
        let samples = crate::audio::wav::samples_to_f32(&decoded.samples);
        let params = Self::inference_params(options);

        let backend = self.ensure_loaded()?;
        let result = backend
            .transcribe_samples(samples, Some(params))
            .map_err(|e| {
                SottoError::engine_inference_failed("whisper_turbo", audio_path, e)
            })?;

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

/// Where the ggml checkpoint for this config lives.
fn resolve_model_path(config: &EngineConfig) -> PathBuf {
    let base = config.model_cache_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sotto")
            .join("models")
    });
    base.join(format!("ggml-{}.bin", config.model_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineKind;

    #[test]
    fn model_path_uses_cache_dir_and_name() {
        let config = EngineConfig::new(EngineKind::WhisperTurbo, Some("large-v3"))
            .unwrap()
            .with_model_cache_dir("/models");
        assert_eq!(
            resolve_model_path(&config),
            PathBuf::from("/models/ggml-large-v3.bin")
        );
    }

    #[test]
    fn missing_model_surfaces_dependency_error() {
        let config = EngineConfig::new(EngineKind::WhisperTurbo, None)
            .unwrap()
            .with_model_cache_dir("/nonexistent/models");
        let mut engine = WhisperTurboEngine::new(config).unwrap();
        let err = engine.ensure_loaded().map(|_| ()).unwrap_err();
        assert_eq!(err.kind(), "Dependency");
    }
}
