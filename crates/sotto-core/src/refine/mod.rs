//! Second-pass transcript refinement.
//!
//! A `Refiner` receives the full transcript text and returns an improved
//! string. The LLM-backed implementation talks to a local Ollama server;
//! `NullRefiner` is the identity used when refinement is disabled.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::TranscriptSegment;
use crate::error::{ErrorDetails, Result, SottoError};

pub mod extract;

pub use extract::extract_assistant_response;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:1.5b";

/// Named refinement prompt modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefinementMode {
    #[default]
    GrammarOnly,
    Summary,
    BulletPoints,
}

impl RefinementMode {
    /// The system prompt for this mode.
    pub fn prompt(&self) -> &'static str {
        match self {
            RefinementMode::GrammarOnly => {
                "Refine the following transcript by:\n\
                 1. Correcting grammar and punctuation\n\
                 2. Fixing capitalization\n\
                 3. Removing filler words and false starts\n\
                 4. Improving fluency while preserving meaning\n\
                 5. Maintaining the speaker's intent\n\n\
                 Do not add or remove information. Only improve clarity and correctness."
            }
            RefinementMode::Summary => {
                "Summarize the following transcript concisely while preserving key points \
                 and main ideas. Focus on clarity and brevity."
            }
            RefinementMode::BulletPoints => {
                "Convert the following transcript into concise bullet points. \
                 Extract key information and organize it in a clear, structured format."
            }
        }
    }
}

impl fmt::Display for RefinementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefinementMode::GrammarOnly => write!(f, "grammar_only"),
            RefinementMode::Summary => write!(f, "summary"),
            RefinementMode::BulletPoints => write!(f, "bullet_points"),
        }
    }
}

impl FromStr for RefinementMode {
    type Err = SottoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "grammar_only" | "grammar" => Ok(RefinementMode::GrammarOnly),
            "summary" => Ok(RefinementMode::Summary),
            "bullet_points" | "bullets" => Ok(RefinementMode::BulletPoints),
            other => Err(SottoError::invalid_profile(
                other,
                &["grammar_only", "summary", "bullet_points"],
            )),
        }
    }
}

/// Interface for transcript refiners.
pub trait Refiner: Send {
    /// Refine the full transcript text.
    fn refine(&self, text: &str, instructions: Option<&str>) -> Result<String>;

    /// Refine segments, filling `refined_text` while preserving alignment.
    ///
    /// Default: join raw text, refine once, attach the result to all
    /// segments.
    fn refine_segments(
        &self,
        segments: &[TranscriptSegment],
        mode: Option<RefinementMode>,
        instructions: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        let combined: String = segments
            .iter()
            .map(|s| s.raw_text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if combined.is_empty() {
            return Ok(segments.to_vec());
        }

        let prompt = instructions
            .map(String::from)
            .unwrap_or_else(|| mode.unwrap_or_default().prompt().to_string());
        let refined = self.refine(&combined, Some(&prompt))?;

        Ok(segments
            .iter()
            .map(|seg| {
                let mut out = seg.clone();
                out.refined_text = Some(refined.clone());
                out
            })
            .collect())
    }
}

/// No-op refiner used when refinement is disabled.
pub struct NullRefiner;

impl Refiner for NullRefiner {
    fn refine(&self, text: &str, _instructions: Option<&str>) -> Result<String> {
        Ok(text.to_string())
    }

    fn refine_segments(
        &self,
        segments: &[TranscriptSegment],
        _mode: Option<RefinementMode>,
        _instructions: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        Ok(segments.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

/// Refiner backed by a local Ollama server.
pub struct OllamaRefiner {
    server_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaRefiner {
    pub fn new(server_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for OllamaRefiner {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL, DEFAULT_OLLAMA_MODEL)
    }
}

impl Refiner for OllamaRefiner {
    fn refine(&self, text: &str, instructions: Option<&str>) -> Result<String> {
        let cleaned = text.trim();
        if cleaned.is_empty() {
            return Ok(String::new());
        }

        let system_prompt = instructions.unwrap_or(RefinementMode::GrammarOnly.prompt());
        let prompt = format!(
            "{}\n\nRespond with ONLY the refined transcript. Do not explain your changes or \
             show your reasoning. Output the corrected text directly.",
            system_prompt
        );

        let url = format!("{}/api/chat", self.server_url.trim_end_matches('/'));
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                SottoError::Refinement(
                    ErrorDetails::new("Failed to create HTTP client").with_cause(e),
                )
            })?;

        let response = client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": prompt},
                    {"role": "user", "content": cleaned}
                ],
                "stream": false
            }))
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    SottoError::Refinement(
                        ErrorDetails::new(format!(
                            "Cannot connect to Ollama at {}",
                            self.server_url
                        ))
                        .with_suggestion("Start the server with: ollama serve")
                        .with_suggestion("Or disable refinement with --no-refine"),
                    )
                } else {
                    SottoError::Refinement(
                        ErrorDetails::new("Refinement request failed").with_cause(e),
                    )
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(SottoError::Refinement(
                ErrorDetails::new(format!("Ollama returned status {}", status))
                    .with_context("model", self.model.clone())
                    .with_context("body", body.chars().take(200).collect::<String>()),
            ));
        }

        let chat: OllamaChatResponse = response.json().map_err(|e| {
            SottoError::Refinement(
                ErrorDetails::new("Invalid response from Ollama").with_cause(e),
            )
        })?;

        let raw_output = chat.message.content.trim().to_string();
        let refined = extract_assistant_response(&raw_output, cleaned);

        // The extractor falls back to the input when the model's answer is
        // empty, too short, or leaks the prompt. Surface that as an error so
        // callers can demote it to a warning and keep the raw transcript.
        if refined == cleaned && raw_output != cleaned {
            return Err(SottoError::refinement_output_invalid(
                cleaned.len(),
                raw_output.len(),
                "output failed validation",
            ));
        }
        Ok(refined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_refiner_is_identity() {
        let refiner = NullRefiner;
        assert_eq!(refiner.refine("um hello", None).unwrap(), "um hello");

        let segments = vec![TranscriptSegment::new("s0", 0.0, 1.0, "raw")];
        let out = refiner.refine_segments(&segments, None, None).unwrap();
        assert_eq!(out, segments);
    }

    #[test]
    fn mode_parsing_accepts_aliases() {
        assert_eq!("grammar".parse::<RefinementMode>().unwrap(), RefinementMode::GrammarOnly);
        assert_eq!("bullets".parse::<RefinementMode>().unwrap(), RefinementMode::BulletPoints);
        assert!("haiku".parse::<RefinementMode>().is_err());
    }

    #[test]
    fn default_refine_segments_attaches_to_all() {
        struct Upper;
        impl Refiner for Upper {
            fn refine(&self, text: &str, _instructions: Option<&str>) -> Result<String> {
                Ok(text.to_uppercase())
            }
        }

        let segments = vec![
            TranscriptSegment::new("s0", 0.0, 1.0, "hello"),
            TranscriptSegment::new("s1", 1.0, 2.0, "world"),
        ];
        let out = Upper.refine_segments(&segments, None, None).unwrap();
        assert_eq!(out.len(), 2);
        for seg in &out {
            assert_eq!(seg.refined_text.as_deref(), Some("HELLO WORLD"));
        }
        // Timing is untouched
        assert_eq!(out[1].start_s, 1.0);
    }

    #[test]
    fn refine_segments_with_empty_text_is_passthrough() {
        struct Panics;
        impl Refiner for Panics {
            fn refine(&self, _text: &str, _instructions: Option<&str>) -> Result<String> {
                panic!("must not be called for empty transcripts");
            }
        }
        let segments = vec![TranscriptSegment::new("s0", 0.0, 1.0, "   ")];
        let out = Panics.refine_segments(&segments, None, None).unwrap();
        assert_eq!(out, segments);
    }

    #[test]
    fn grammar_prompt_mentions_core_rules() {
        let prompt = RefinementMode::GrammarOnly.prompt();
        assert!(prompt.contains("grammar"));
        assert!(prompt.contains("filler words"));
    }
}
