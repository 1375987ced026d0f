pub mod batch;
pub mod bench;
pub mod condense;
pub mod daemon;
pub mod decode;
pub mod record;
pub mod refine;
pub mod transcribe;
pub mod transcribe_full;
pub mod vad;

use sotto_core::{
    ComputeType, Device, EngineConfig, EngineKind, EngineProfile, Result, SegmentationProfile,
    TranscriptionOptions, get_engine_preset, get_segmentation_preset,
};

use crate::args::{EngineOptions, SegmentationOptions};

/// Build a validated engine profile from CLI options.
pub fn build_engine_profile(opts: &EngineOptions) -> Result<EngineProfile> {
    let (kind, mut config) = match &opts.engine_preset {
        Some(preset) => get_engine_preset(preset)?,
        None => {
            let kind: EngineKind = opts.engine.parse()?;
            let config = EngineConfig::new(kind, opts.model.as_deref())?
                .with_device(opts.device.parse::<Device>()?)
                .with_compute_type(opts.compute_type.parse::<ComputeType>()?);
            (kind, config)
        }
    };

    if let Some(dir) = &opts.model_dir {
        config = config.with_model_cache_dir(dir);
    }

    let options = TranscriptionOptions {
        language: opts.language.clone(),
        ..TranscriptionOptions::default()
    };
    Ok(EngineProfile::new(kind, config, options))
}

/// Build a segmentation profile from the preset plus CLI overrides.
pub fn build_segmentation_profile(opts: &SegmentationOptions) -> Result<SegmentationProfile> {
    let mut profile = get_segmentation_preset(&opts.seg_preset)?;
    if let Some(threshold) = opts.vad_threshold {
        profile.threshold = threshold;
    }
    if let Some(max_chunk) = opts.max_chunk_s {
        profile.max_chunk_s = max_chunk;
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_opts() -> EngineOptions {
        EngineOptions {
            engine: "whisper_turbo".into(),
            model: None,
            device: "cpu".into(),
            compute_type: "int8".into(),
            model_dir: None,
            engine_preset: None,
            language: Some("de".into()),
        }
    }

    #[test]
    fn engine_profile_from_flags() {
        let profile = build_engine_profile(&engine_opts()).unwrap();
        assert_eq!(profile.kind, EngineKind::WhisperTurbo);
        assert_eq!(profile.config.model_name, "turbo");
        assert_eq!(profile.config.device, Device::Cpu);
        assert_eq!(profile.options.language.as_deref(), Some("de"));
    }

    #[test]
    fn engine_preset_overrides_flags() {
        let mut opts = engine_opts();
        opts.engine_preset = Some("cpu_compatible".into());
        let profile = build_engine_profile(&opts).unwrap();
        assert_eq!(profile.kind, EngineKind::WhisperTurbo);
        assert_eq!(profile.config.device, Device::Cpu);
    }

    #[test]
    fn invalid_engine_kind_fails() {
        let mut opts = engine_opts();
        opts.engine = "canary".into();
        assert!(build_engine_profile(&opts).is_err());
    }

    #[test]
    fn segmentation_overrides_apply() {
        let opts = SegmentationOptions {
            seg_preset: "balanced".into(),
            vad_threshold: Some(0.3),
            max_chunk_s: Some(45.0),
        };
        let profile = build_segmentation_profile(&opts).unwrap();
        assert_eq!(profile.threshold, 0.3);
        assert_eq!(profile.max_chunk_s, 45.0);
    }
}
