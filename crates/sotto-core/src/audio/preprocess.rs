//! Optional audio preprocessing via an ffmpeg filter chain.
//!
//! Combines highpass, lowpass, volume adjustment, and EBU R128 loudness
//! normalization in a single pass, resampling to 16 kHz mono.
//!
//! Presets: none, basic (normalize), clean (denoise + normalize),
//! phone (denoise + normalize + HP300 + LP3400), podcast (normalize + HP80).

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ErrorDetails, Result, SottoError};

/// Configuration for audio preprocessing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreprocessingConfig {
    /// Apply noise reduction (bandpass filtering)
    pub denoise: bool,
    /// Apply EBU R128 loudness normalization
    pub normalize: bool,
    pub highpass_hz: Option<u32>,
    pub lowpass_hz: Option<u32>,
    pub volume_adjust_db: Option<f64>,
}

const PRESET_NAMES: &[&str] = &["none", "basic", "clean", "phone", "podcast"];

impl PreprocessingConfig {
    /// Create config from a preset name.
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "none" => Ok(Self::default()),
            "basic" => Ok(Self {
                normalize: true,
                ..Self::default()
            }),
            "clean" => Ok(Self {
                denoise: true,
                normalize: true,
                ..Self::default()
            }),
            "phone" => Ok(Self {
                denoise: true,
                normalize: true,
                highpass_hz: Some(300),
                lowpass_hz: Some(3400),
                ..Self::default()
            }),
            "podcast" => Ok(Self {
                normalize: true,
                highpass_hz: Some(80),
                ..Self::default()
            }),
            other => Err(SottoError::invalid_profile(other, PRESET_NAMES)),
        }
    }

    pub fn available_presets() -> &'static [&'static str] {
        PRESET_NAMES
    }

    /// Whether any preprocessing field is non-default.
    pub fn needs_preprocessing(&self) -> bool {
        self.denoise
            || self.normalize
            || self.highpass_hz.is_some()
            || self.lowpass_hz.is_some()
            || self.volume_adjust_db.is_some()
    }

    /// Build the ordered ffmpeg filter list.
    pub fn build_filter_chain(&self) -> String {
        let mut filters: Vec<String> = Vec::new();

        if let Some(hz) = self.highpass_hz {
            filters.push(format!("highpass=f={}", hz));
        }
        if let Some(hz) = self.lowpass_hz {
            filters.push(format!("lowpass=f={}", hz));
        }
        if self.denoise {
            // Bandpass defaults when no explicit frequencies given
            if self.highpass_hz.is_none() {
                filters.push("highpass=f=200".to_string());
            }
            if self.lowpass_hz.is_none() {
                filters.push("lowpass=f=3500".to_string());
            }
        }
        if let Some(db) = self.volume_adjust_db {
            filters.push(format!("volume={}dB", db));
        }
        if self.normalize {
            filters.push("loudnorm=I=-16:TP=-1.5:LRA=11".to_string());
        }

        filters.join(",")
    }

    fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.denoise {
            parts.push("noise reduction".into());
        }
        if self.normalize {
            parts.push("volume normalization".into());
        }
        if let Some(hz) = self.highpass_hz {
            parts.push(format!("highpass {}Hz", hz));
        }
        if let Some(hz) = self.lowpass_hz {
            parts.push(format!("lowpass {}Hz", hz));
        }
        if let Some(db) = self.volume_adjust_db {
            parts.push(format!("{:+.1}dB gain", db));
        }
        if parts.is_empty() {
            "none".into()
        } else {
            parts.join(", ")
        }
    }
}

/// Applies the preprocessing filter chain using ffmpeg.
pub struct AudioPreprocessor {
    config: PreprocessingConfig,
    ffmpeg_path: String,
}

impl AudioPreprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self {
            config,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    pub fn needs_preprocessing(&self) -> bool {
        self.config.needs_preprocessing()
    }

    /// Apply the filter chain. Returns `input` unchanged (and writes
    /// nothing) when no preprocessing is enabled.
    pub fn preprocess(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        if !self.needs_preprocessing() {
            crate::verbose!("No preprocessing needed, returning input path");
            return Ok(input.to_path_buf());
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let filters = self.config.build_filter_chain();
        let result = Command::new(&self.ffmpeg_path)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-af")
            .arg(&filters)
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-y")
            .arg(output)
            .output();

        let cmd_output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SottoError::missing_ffmpeg());
            }
            Err(e) => return Err(e.into()),
        };

        if !cmd_output.status.success() {
            let stderr = String::from_utf8_lossy(&cmd_output.stderr);
            return Err(SottoError::AudioProcessing(
                ErrorDetails::new("Audio preprocessing failed")
                    .with_context("input_file", input.display().to_string())
                    .with_context("filters", filters)
                    .with_context("ffmpeg_exit_code", cmd_output.status.code().unwrap_or(-1))
                    .with_suggestion("Try without preprocessing: remove the --preprocess flag")
                    .with_suggestion(format!(
                        "FFmpeg error: {}",
                        stderr.chars().take(200).collect::<String>()
                    )),
            ));
        }

        crate::verbose!("Preprocessing applied: {}", self.config.describe());
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_needs_nothing() {
        assert!(!PreprocessingConfig::default().needs_preprocessing());
    }

    #[test]
    fn preset_lookup() {
        let clean = PreprocessingConfig::from_preset("clean").unwrap();
        assert!(clean.denoise && clean.normalize);

        let phone = PreprocessingConfig::from_preset("phone").unwrap();
        assert_eq!(phone.highpass_hz, Some(300));
        assert_eq!(phone.lowpass_hz, Some(3400));

        assert!(PreprocessingConfig::from_preset("bogus").is_err());
    }

    #[test]
    fn filter_chain_order_and_defaults() {
        let config = PreprocessingConfig {
            denoise: true,
            normalize: true,
            ..Default::default()
        };
        assert_eq!(
            config.build_filter_chain(),
            "highpass=f=200,lowpass=f=3500,loudnorm=I=-16:TP=-1.5:LRA=11"
        );
    }

    #[test]
    fn explicit_frequencies_suppress_denoise_defaults() {
        let config = PreprocessingConfig {
            denoise: true,
            highpass_hz: Some(300),
            lowpass_hz: Some(3400),
            ..Default::default()
        };
        assert_eq!(config.build_filter_chain(), "highpass=f=300,lowpass=f=3400");
    }

    #[test]
    fn volume_filter_formats_db() {
        let config = PreprocessingConfig {
            volume_adjust_db: Some(3.5),
            ..Default::default()
        };
        assert_eq!(config.build_filter_chain(), "volume=3.5dB");
    }

    #[test]
    fn noop_preprocess_returns_input_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        std::fs::write(&input, b"stub").unwrap();

        let preprocessor = AudioPreprocessor::new(PreprocessingConfig::default());
        let result = preprocessor.preprocess(&input, &output).unwrap();

        assert_eq!(result, input);
        assert!(!output.exists(), "output must not be created");
    }
}
