//! Model registry: canonical model names, aliases, and validation per
//! engine kind.

use crate::config::EngineKind;
use crate::error::{Result, SottoError};

/// Whisper models as shipped by whisper.cpp (ggml checkpoints).
pub const DEFAULT_WHISPER_MODEL: &str = "turbo";
pub const WHISPER_MODELS: &[&str] = &[
    "turbo", "large-v3", "large-v2", "large", "medium", "small", "base", "tiny",
];

/// Parakeet ONNX model directories.
pub const DEFAULT_PARAKEET_MODEL: &str = "parakeet-tdt-0.6b-v3";
pub const PARAKEET_MODELS: &[&str] = &["parakeet-tdt-0.6b-v3", "parakeet-tdt-0.6b-v2"];

fn aliases(kind: EngineKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        EngineKind::WhisperTurbo => &[
            ("default", DEFAULT_WHISPER_MODEL),
            ("large-v3-turbo", "turbo"),
        ],
        EngineKind::Parakeet => &[
            ("default", DEFAULT_PARAKEET_MODEL),
            ("tdt", DEFAULT_PARAKEET_MODEL),
        ],
    }
}

fn catalog(kind: EngineKind) -> &'static [&'static str] {
    match kind {
        EngineKind::WhisperTurbo => WHISPER_MODELS,
        EngineKind::Parakeet => PARAKEET_MODELS,
    }
}

/// Normalize and validate a model name for `kind`.
///
/// Resolves aliases to canonical names and validates against the allowed
/// set. Returns the kind's default model when `model_name` is `None`.
pub fn normalize_model_name(kind: EngineKind, model_name: Option<&str>) -> Result<String> {
    let name = match model_name {
        None | Some("") => {
            return Ok(match kind {
                EngineKind::WhisperTurbo => DEFAULT_WHISPER_MODEL.to_string(),
                EngineKind::Parakeet => DEFAULT_PARAKEET_MODEL.to_string(),
            });
        }
        Some(name) => name.to_lowercase(),
    };

    if let Some(&(_, canonical)) = aliases(kind).iter().find(|(alias, _)| *alias == name) {
        return Ok(canonical.to_string());
    }

    if catalog(kind).contains(&name.as_str()) {
        return Ok(name);
    }

    Err(SottoError::config(format!(
        "Invalid model '{}' for {} engine. Available models: {}",
        name,
        kind,
        catalog(kind).join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_resolves_to_default() {
        assert_eq!(
            normalize_model_name(EngineKind::WhisperTurbo, None).unwrap(),
            "turbo"
        );
        assert_eq!(
            normalize_model_name(EngineKind::Parakeet, None).unwrap(),
            "parakeet-tdt-0.6b-v3"
        );
    }

    #[test]
    fn aliases_resolve_to_canonical_names() {
        assert_eq!(
            normalize_model_name(EngineKind::WhisperTurbo, Some("large-v3-turbo")).unwrap(),
            "turbo"
        );
        assert_eq!(
            normalize_model_name(EngineKind::Parakeet, Some("default")).unwrap(),
            "parakeet-tdt-0.6b-v3"
        );
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(
            normalize_model_name(EngineKind::WhisperTurbo, Some("Large-V3")).unwrap(),
            "large-v3"
        );
    }

    #[test]
    fn unknown_model_is_rejected_with_available_list() {
        let err = normalize_model_name(EngineKind::WhisperTurbo, Some("gpt-5")).unwrap_err();
        assert_eq!(err.kind(), "Configuration");
        assert!(err.message().contains("turbo"));
    }

    #[test]
    fn whisper_models_are_not_valid_for_parakeet() {
        assert!(normalize_model_name(EngineKind::Parakeet, Some("turbo")).is_err());
    }
}
