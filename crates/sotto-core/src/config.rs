//! Typed configuration: engine/segmentation profiles, artifact layout,
//! and the preset catalogs exposed to CLI and GUI consumers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::engine::registry::normalize_model_name;
use crate::error::{Result, SottoError};

/// Supported transcription engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    WhisperTurbo,
    Parakeet,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::WhisperTurbo => "whisper_turbo",
            EngineKind::Parakeet => "parakeet",
        }
    }

    pub fn all() -> &'static [EngineKind] {
        &[EngineKind::WhisperTurbo, EngineKind::Parakeet]
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "whisper_turbo" | "whisper" => Ok(EngineKind::WhisperTurbo),
            "parakeet" => Ok(EngineKind::Parakeet),
            other => Err(SottoError::config(format!(
                "Unknown engine kind: '{}'. Supported engines: whisper_turbo, parakeet",
                other
            ))),
        }
    }
}

/// Inference device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => write!(f, "auto"),
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

impl FromStr for Device {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            other => Err(SottoError::config(format!(
                "Unknown device: '{}'. Use 'auto', 'cpu', or 'cuda'",
                other
            ))),
        }
    }
}

/// Numeric precision for model weights and inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeType {
    #[default]
    Auto,
    Fp32,
    Fp16,
    Bf16,
    Int8,
    Int8Fp16,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Auto => "auto",
            ComputeType::Fp32 => "fp32",
            ComputeType::Fp16 => "fp16",
            ComputeType::Bf16 => "bf16",
            ComputeType::Int8 => "int8",
            ComputeType::Int8Fp16 => "int8_fp16",
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ComputeType {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ComputeType::Auto),
            "fp32" | "float32" => Ok(ComputeType::Fp32),
            "fp16" | "float16" => Ok(ComputeType::Fp16),
            "bf16" | "bfloat16" => Ok(ComputeType::Bf16),
            "int8" => Ok(ComputeType::Int8),
            "int8_fp16" | "int8_float16" => Ok(ComputeType::Int8Fp16),
            other => Err(SottoError::config(format!(
                "Unknown compute type: '{}'. Use auto, fp32, fp16, bf16, int8, or int8_fp16",
                other
            ))),
        }
    }
}

/// Engine configuration, normalised at construction.
///
/// Unknown model names for a kind are rejected by the model registry.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub model_name: String,
    pub device: Device,
    pub compute_type: ComputeType,
    pub model_cache_dir: Option<PathBuf>,
    pub params: BTreeMap<String, String>,
}

impl EngineConfig {
    /// Build a validated config for `kind`. `model_name = None` selects the
    /// kind's default model; aliases are resolved to canonical names.
    pub fn new(kind: EngineKind, model_name: Option<&str>) -> Result<Self> {
        Ok(Self {
            model_name: normalize_model_name(kind, model_name)?,
            device: Device::Auto,
            compute_type: ComputeType::Auto,
            model_cache_dir: None,
            params: BTreeMap::new(),
        })
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_compute_type(mut self, compute_type: ComputeType) -> Self {
        self.compute_type = compute_type;
        self
    }

    pub fn with_model_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_cache_dir = Some(dir.into());
        self
    }
}

/// VAD and chunking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationProfile {
    /// Speech probability threshold in (0, 1)
    pub threshold: f32,
    /// Minimum silence to end a speech span (ms)
    pub min_silence_ms: u32,
    /// Minimum duration for a span to count as speech (ms)
    pub min_speech_ms: u32,
    /// Padding applied to span boundaries (ms)
    pub speech_pad_ms: u32,
    /// Maximum single speech span before VAD splits it (s)
    pub max_speech_duration_s: f64,
    /// Maximum condensed chunk length (s)
    pub max_chunk_s: f64,
    /// Position within a chunk after which gap splits are considered (s)
    pub chunk_search_start_s: f64,
    /// Minimum inter-span gap required to split a chunk (s)
    pub min_gap_for_split_s: f64,
    /// PCM sample rate the pipeline operates at
    pub sample_rate: u32,
    /// Device the VAD model runs on
    pub device: Device,
}

impl Default for SegmentationProfile {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_ms: 500,
            min_speech_ms: 250,
            speech_pad_ms: 250,
            max_speech_duration_s: 40.0,
            max_chunk_s: 60.0,
            chunk_search_start_s: 30.0,
            min_gap_for_split_s: 3.0,
            sample_rate: 16_000,
            device: Device::Cpu,
        }
    }
}

/// Per-run transcription options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptionOptions {
    pub language: Option<String>,
    pub preset: Option<String>,
    pub prompt: Option<String>,
    pub beam_size: Option<u32>,
    pub temperature: Option<f32>,
    pub params: BTreeMap<String, String>,
}

impl TranscriptionOptions {
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or("en")
    }
}

/// Engine kind + config + options, passed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineProfile {
    pub kind: EngineKind,
    pub config: EngineConfig,
    pub options: TranscriptionOptions,
}

impl EngineProfile {
    pub fn new(kind: EngineKind, config: EngineConfig, options: TranscriptionOptions) -> Self {
        Self { kind, config, options }
    }
}

/// Where and how intermediate artifacts are written.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactConfig {
    pub output_directory: PathBuf,
    /// Template with fields {input_name}, {input_stem}, {step}, {ext}
    pub naming_pattern: String,
    pub cleanup_intermediates: bool,
    pub keep_on_error: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            output_directory: std::env::temp_dir().join("sotto"),
            naming_pattern: "{input_stem}_{step}.{ext}".to_string(),
            cleanup_intermediates: true,
            keep_on_error: false,
        }
    }
}

impl ArtifactConfig {
    /// Render the naming pattern for one artifact.
    pub fn artifact_name(&self, input_name: &str, input_stem: &str, step: &str, ext: &str) -> String {
        self.naming_pattern
            .replace("{input_name}", input_name)
            .replace("{input_stem}", input_stem)
            .replace("{step}", step)
            .replace("{ext}", ext)
    }
}

/// A named configuration bundle with GUI-facing metadata.
#[derive(Debug, Clone)]
pub struct PresetInfo<T> {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub config: T,
}

impl<T> PresetInfo<T> {
    /// Serialize the descriptive part for GUI consumption.
    pub fn describe(&self) -> Value {
        json!({
            "name": self.name,
            "display_name": self.display_name,
            "description": self.description,
        })
    }
}

/// An engine preset pairs a kind with its config.
pub type EnginePreset = PresetInfo<(EngineKind, EngineConfig)>;
pub type SegmentationPreset = PresetInfo<SegmentationProfile>;

/// Engine configuration presets.
pub fn engine_presets() -> Vec<EnginePreset> {
    let parakeet = |device, compute| {
        EngineConfig::new(EngineKind::Parakeet, None)
            .expect("default parakeet model is registered")
            .with_device(device)
            .with_compute_type(compute)
    };
    let whisper = |device, compute| {
        EngineConfig::new(EngineKind::WhisperTurbo, None)
            .expect("default whisper model is registered")
            .with_device(device)
            .with_compute_type(compute)
    };
    vec![
        PresetInfo {
            name: "balanced",
            display_name: "Balanced (Recommended)",
            description: "Good balance of quality and speed. Parakeet with FP16 precision.",
            config: (EngineKind::Parakeet, parakeet(Device::Auto, ComputeType::Fp16)),
        },
        PresetInfo {
            name: "high_quality",
            display_name: "High Quality",
            description: "Maximum accuracy using BF16 precision. Slightly slower but best results.",
            config: (EngineKind::Parakeet, parakeet(Device::Cuda, ComputeType::Bf16)),
        },
        PresetInfo {
            name: "fast",
            display_name: "Fast",
            description: "Optimized for speed using INT8 quantization. Slightly reduced quality.",
            config: (EngineKind::Parakeet, parakeet(Device::Auto, ComputeType::Int8)),
        },
        PresetInfo {
            name: "cpu_compatible",
            display_name: "CPU Compatible",
            description: "Works without an NVIDIA GPU. Whisper Turbo on CPU. Slower but widely compatible.",
            config: (EngineKind::WhisperTurbo, whisper(Device::Cpu, ComputeType::Int8)),
        },
    ]
}

/// Segmentation configuration presets.
pub fn segmentation_presets() -> Vec<SegmentationPreset> {
    let base = SegmentationProfile::default();
    vec![
        PresetInfo {
            name: "balanced",
            display_name: "Balanced (Recommended)",
            description: "Good for most audio. Detects speech reliably while ignoring brief noises.",
            config: base.clone(),
        },
        PresetInfo {
            name: "sensitive",
            display_name: "Sensitive",
            description: "Captures quieter speech. Good for soft-spoken speakers or distant microphones.",
            config: SegmentationProfile {
                threshold: 0.3,
                min_silence_ms: 300,
                min_speech_ms: 200,
                speech_pad_ms: 300,
                min_gap_for_split_s: 2.0,
                ..base.clone()
            },
        },
        PresetInfo {
            name: "strict",
            display_name: "Strict",
            description: "Ignores background noise. Good for noisy environments or recordings with music.",
            config: SegmentationProfile {
                threshold: 0.7,
                min_silence_ms: 700,
                min_speech_ms: 300,
                speech_pad_ms: 200,
                min_gap_for_split_s: 4.0,
                ..base.clone()
            },
        },
        PresetInfo {
            name: "podcast",
            display_name: "Podcast/Interview",
            description: "Optimized for dialogue with multiple speakers. Preserves natural pauses.",
            config: SegmentationProfile {
                min_silence_ms: 400,
                min_speech_ms: 300,
                speech_pad_ms: 200,
                chunk_search_start_s: 40.0,
                min_gap_for_split_s: 2.5,
                ..base.clone()
            },
        },
        PresetInfo {
            name: "lecture",
            display_name: "Lecture/Presentation",
            description: "Optimized for a single speaker with longer pauses. Good for educational content.",
            config: SegmentationProfile {
                threshold: 0.4,
                min_silence_ms: 600,
                speech_pad_ms: 300,
                chunk_search_start_s: 35.0,
                min_gap_for_split_s: 3.5,
                ..base
            },
        },
    ]
}

/// Look up an engine preset by name.
pub fn get_engine_preset(name: &str) -> Result<(EngineKind, EngineConfig)> {
    engine_presets()
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.config)
        .ok_or_else(|| {
            let names: Vec<&str> = engine_presets().iter().map(|p| p.name).collect();
            SottoError::invalid_profile(name, &names)
        })
}

/// Look up a segmentation preset by name.
pub fn get_segmentation_preset(name: &str) -> Result<SegmentationProfile> {
    segmentation_presets()
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.config)
        .ok_or_else(|| {
            let names: Vec<&str> = segmentation_presets().iter().map(|p| p.name).collect();
            SottoError::invalid_profile(name, &names)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_parses_aliases() {
        assert_eq!("whisper-turbo".parse::<EngineKind>().unwrap(), EngineKind::WhisperTurbo);
        assert_eq!("Parakeet".parse::<EngineKind>().unwrap(), EngineKind::Parakeet);
        assert!("canary".parse::<EngineKind>().is_err());
    }

    #[test]
    fn unknown_engine_kind_is_configuration_error() {
        let err = "nonexistent".parse::<EngineKind>().unwrap_err();
        assert_eq!(err.kind(), "Configuration");
    }

    #[test]
    fn compute_type_accepts_long_names() {
        assert_eq!("float16".parse::<ComputeType>().unwrap(), ComputeType::Fp16);
        assert_eq!("int8_float16".parse::<ComputeType>().unwrap(), ComputeType::Int8Fp16);
    }

    #[test]
    fn artifact_name_substitutes_all_fields() {
        let cfg = ArtifactConfig::default();
        assert_eq!(cfg.artifact_name("foo.mp3", "foo", "decoded", "wav"), "foo_decoded.wav");

        let custom = ArtifactConfig {
            naming_pattern: "{input_name}.{step}.{ext}".into(),
            ..ArtifactConfig::default()
        };
        assert_eq!(
            custom.artifact_name("foo.mp3", "foo", "transcript", "txt"),
            "foo.mp3.transcript.txt"
        );
    }

    #[test]
    fn engine_presets_cover_both_kinds() {
        let presets = engine_presets();
        assert!(presets.iter().any(|p| p.config.0 == EngineKind::Parakeet));
        assert!(presets.iter().any(|p| p.config.0 == EngineKind::WhisperTurbo));
    }

    #[test]
    fn unknown_preset_lists_available_names() {
        let err = get_segmentation_preset("nonexistent").unwrap_err();
        assert_eq!(err.kind(), "Configuration");
        let available = err.details().unwrap().context["available"].as_str().unwrap().to_string();
        assert!(available.contains("balanced"));
    }

    #[test]
    fn sensitive_preset_lowers_threshold() {
        let profile = get_segmentation_preset("sensitive").unwrap();
        assert_eq!(profile.threshold, 0.3);
        assert_eq!(profile.min_silence_ms, 300);
    }
}
