//! Core value objects shared across the pipeline.

use serde::{Deserialize, Serialize};

/// A raw speech interval on the audio timeline, in seconds.
///
/// Invariant: `0 <= start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeechSpan {
    pub start: f64,
    pub end: f64,
}

impl SpeechSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Canonical PCM audio after decode (mono, 16 kHz, 16-bit LE).
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_s: f64,
    pub samples: Vec<i16>,
}

/// Metadata probed from an audio file before decoding.
#[derive(Debug, Clone)]
pub struct AudioFileInfo {
    pub duration_s: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: String,
    pub bitrate_kbps: Option<u32>,
    pub format_name: String,
    pub file_size_mb: f64,
}

/// A timed text span on the original audio timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: String,
    pub start_s: f64,
    pub end_s: f64,
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl TranscriptSegment {
    pub fn new(id: impl Into<String>, start_s: f64, end_s: f64, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start_s,
            end_s,
            raw_text: raw_text.into(),
            refined_text: None,
            language: None,
            confidence: None,
        }
    }

    /// The effective text: refined when present, raw otherwise.
    pub fn text(&self) -> &str {
        self.refined_text.as_deref().unwrap_or(&self.raw_text)
    }

    /// Copy of this segment shifted by `offset` seconds.
    pub fn offset_by(&self, offset: f64) -> Self {
        let mut shifted = self.clone();
        shifted.start_s += offset;
        shifted.end_s += offset;
        shifted
    }
}

/// Identity and placement of a loaded engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineMetadata {
    pub model_name: String,
    pub device: String,
    pub precision: String,
}

/// The complete output of one transcription run.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    pub model_name: String,
    pub device: String,
    pub precision: String,
    pub engine: String,
    pub duration_s: f64,
    pub warnings: Vec<String>,
}

/// Join segment text into a single transcript string.
pub fn segments_to_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|seg| seg.text().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

impl TranscriptionResult {
    /// Assemble a result from stitched segments, enforcing the text and
    /// duration invariants (`text == join(" ", texts)`, `duration_s ==
    /// last segment end`).
    pub fn from_segments(
        segments: Vec<TranscriptSegment>,
        metadata: &EngineMetadata,
        engine: impl Into<String>,
        warnings: Vec<String>,
    ) -> Self {
        let text = segments_to_text(&segments);
        let duration_s = segments.last().map(|s| s.end_s).unwrap_or(0.0);
        Self {
            text,
            segments,
            model_name: metadata.model_name.clone(),
            device: metadata.device.clone(),
            precision: metadata.precision.clone(),
            engine: engine.into(),
            duration_s,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_text_prefers_refined() {
        let mut seg = TranscriptSegment::new("s0", 0.0, 1.0, "raw words");
        assert_eq!(seg.text(), "raw words");
        seg.refined_text = Some("Refined words.".into());
        assert_eq!(seg.text(), "Refined words.");
    }

    #[test]
    fn offset_shifts_both_ends() {
        let seg = TranscriptSegment::new("s0", 1.0, 2.5, "x").offset_by(10.0);
        assert_eq!(seg.start_s, 11.0);
        assert_eq!(seg.end_s, 12.5);
    }

    #[test]
    fn text_assembly_trims_and_joins() {
        let segments = vec![
            TranscriptSegment::new("s0", 0.0, 1.0, "  hello "),
            TranscriptSegment::new("s1", 1.0, 2.0, "world  "),
            TranscriptSegment::new("s2", 2.0, 3.0, "   "),
        ];
        assert_eq!(segments_to_text(&segments), "hello world");
    }

    #[test]
    fn result_duration_is_last_segment_end() {
        let meta = EngineMetadata {
            model_name: "turbo".into(),
            device: "cpu".into(),
            precision: "int8".into(),
        };
        let segments = vec![
            TranscriptSegment::new("s0", 0.0, 30.0, "a"),
            TranscriptSegment::new("s1", 30.0, 57.2, "b"),
        ];
        let result = TranscriptionResult::from_segments(segments, &meta, "whisper_turbo", vec![]);
        assert_eq!(result.duration_s, 57.2);
        assert_eq!(result.text, "a b");
    }

    #[test]
    fn empty_segments_yield_zero_duration() {
        let meta = EngineMetadata {
            model_name: "m".into(),
            device: "cpu".into(),
            precision: "fp32".into(),
        };
        let result = TranscriptionResult::from_segments(vec![], &meta, "parakeet", vec![]);
        assert_eq!(result.duration_s, 0.0);
        assert!(result.text.is_empty());
    }
}
