//! Speech detection using the Silero VAD model.
//!
//! Returns timestamps only, never modifies audio. The detector feeds
//! 512-sample frames to Silero, runs a silence/speech state machine over
//! the per-frame probabilities, then pads, merges, and length-limits the
//! resulting spans.

use std::path::Path;

use crate::config::SegmentationProfile;
use crate::domain::SpeechSpan;
use crate::error::{ErrorDetails, Result, SottoError};

use super::wav;

/// Silero processes 512 samples at a time (32ms at 16kHz)
pub const VAD_FRAME_SIZE: usize = 512;

/// Pure speech detection component - returns timestamps only.
pub struct SpeechDetector {
    sample_rate: u32,
}

impl SpeechDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    /// Analyze a canonical WAV and return padded, merged speech spans.
    ///
    /// Fails with a VAD error when the final list is empty.
    #[cfg(feature = "vad")]
    pub fn detect(&self, wav_path: &Path, profile: &SegmentationProfile) -> Result<Vec<SpeechSpan>> {
        use voice_activity_detector::VoiceActivityDetector;

        if !(0.0..=1.0).contains(&profile.threshold) {
            return Err(SottoError::config(format!(
                "threshold must be in [0.0, 1.0], got {}",
                profile.threshold
            )));
        }
        if profile.max_speech_duration_s <= 0.0 {
            return Err(SottoError::config("max_speech_duration_s must be positive"));
        }

        let decoded = wav::read_decoded(wav_path)?;
        let samples = wav::samples_to_f32(&decoded.samples);

        let mut detector = VoiceActivityDetector::builder()
            .sample_rate(self.sample_rate as i64)
            .chunk_size(VAD_FRAME_SIZE)
            .build()
            .map_err(|e| {
                SottoError::Vad(
                    ErrorDetails::new("Failed to create VAD detector")
                        .with_cause(e)
                        .with_suggestion("The Silero model could not be initialised"),
                )
            })?;

        let mut probabilities = Vec::with_capacity(samples.len() / VAD_FRAME_SIZE + 1);
        for frame in samples.chunks(VAD_FRAME_SIZE) {
            if frame.len() < VAD_FRAME_SIZE {
                break;
            }
            probabilities.push(detector.predict(frame.iter().copied()));
        }

        let raw_spans = spans_from_probabilities(
            &probabilities,
            VAD_FRAME_SIZE,
            self.sample_rate,
            profile.threshold,
            profile.min_silence_ms,
            profile.min_speech_ms,
        );

        let spans = normalize_and_limit(
            &raw_spans,
            self.sample_rate,
            decoded.duration_s,
            profile.speech_pad_ms,
            profile.max_speech_duration_s,
        );

        if spans.is_empty() {
            return Err(SottoError::no_speech_detected(
                wav_path,
                decoded.duration_s,
                profile.threshold,
            ));
        }

        crate::verbose!(
            "VAD found {} speech spans in {:.1}s of audio",
            spans.len(),
            decoded.duration_s
        );
        Ok(spans)
    }

    #[cfg(not(feature = "vad"))]
    pub fn detect(&self, _wav_path: &Path, _profile: &SegmentationProfile) -> Result<Vec<SpeechSpan>> {
        Err(SottoError::Vad(
            ErrorDetails::new("Speech detection requires the 'vad' feature")
                .with_suggestion("Rebuild with --features vad"),
        ))
    }

    /// Detect and write the spans to a JSON cache file.
    #[cfg(feature = "vad")]
    pub fn detect_to_json(
        &self,
        wav_path: &Path,
        profile: &SegmentationProfile,
        output_path: &Path,
    ) -> Result<Vec<SpeechSpan>> {
        let spans = self.detect(wav_path, profile)?;
        save_timestamps(&spans, output_path)?;
        Ok(spans)
    }
}

/// Build raw sample-space spans from per-frame speech probabilities.
///
/// A span opens on the first frame at or above `threshold` and closes once
/// silence has persisted for `min_silence_ms`; spans shorter than
/// `min_speech_ms` are dropped.
pub fn spans_from_probabilities(
    probabilities: &[f32],
    frame_size: usize,
    sample_rate: u32,
    threshold: f32,
    min_silence_ms: u32,
    min_speech_ms: u32,
) -> Vec<(usize, usize)> {
    let frames_per_ms = sample_rate as f64 / 1000.0;
    let min_silence_frames =
        ((min_silence_ms as f64 * frames_per_ms) / frame_size as f64).ceil() as usize;
    let min_speech_samples = (min_speech_ms as f64 * frames_per_ms) as usize;

    let mut spans = Vec::new();
    let mut span_start: Option<usize> = None;
    let mut tentative_end: Option<usize> = None;
    let mut silence_run = 0usize;

    for (i, &prob) in probabilities.iter().enumerate() {
        let frame_start = i * frame_size;
        let frame_end = frame_start + frame_size;

        if prob >= threshold {
            if span_start.is_none() {
                span_start = Some(frame_start);
            }
            tentative_end = None;
            silence_run = 0;
        } else if let Some(start) = span_start {
            if tentative_end.is_none() {
                tentative_end = Some(frame_start);
            }
            silence_run += 1;
            if silence_run >= min_silence_frames.max(1) {
                let end = tentative_end.unwrap_or(frame_end);
                if end.saturating_sub(start) >= min_speech_samples {
                    spans.push((start, end));
                }
                span_start = None;
                tentative_end = None;
                silence_run = 0;
            }
        }
    }

    // Stream ended mid-speech
    if let Some(start) = span_start {
        let end = tentative_end.unwrap_or(probabilities.len() * frame_size);
        if end.saturating_sub(start) >= min_speech_samples {
            spans.push((start, end));
        }
    }

    spans
}

/// Convert sample spans to padded/merged spans in seconds and enforce the
/// maximum span duration.
///
/// Pads each span by `speech_pad_ms`, clamps to `[0, duration_s]`, drops
/// empties, merges any two spans that overlap or touch, then splits any
/// span longer than `max_speech_duration_s` into equal-sized sub-spans.
pub fn normalize_and_limit(
    spans: &[(usize, usize)],
    sample_rate: u32,
    duration_s: f64,
    speech_pad_ms: u32,
    max_speech_duration_s: f64,
) -> Vec<SpeechSpan> {
    if spans.is_empty() {
        return Vec::new();
    }

    let pad_s = speech_pad_ms as f64 / 1000.0;
    let mut padded: Vec<SpeechSpan> = spans
        .iter()
        .filter_map(|&(start_sample, end_sample)| {
            let start = (start_sample as f64 / sample_rate as f64 - pad_s).max(0.0);
            let end = (end_sample as f64 / sample_rate as f64 + pad_s).min(duration_s);
            (end > start).then(|| SpeechSpan::new(start, end))
        })
        .collect();

    padded.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<SpeechSpan> = Vec::with_capacity(padded.len());
    for span in padded {
        match merged.last_mut() {
            Some(prev) if span.start <= prev.end => prev.end = prev.end.max(span.end),
            _ => merged.push(span),
        }
    }

    let mut limited = Vec::with_capacity(merged.len());
    for span in merged {
        let len = span.duration();
        if len <= max_speech_duration_s {
            limited.push(span);
            continue;
        }
        let pieces = (len / max_speech_duration_s).ceil() as usize;
        let piece_len = len / pieces as f64;
        for k in 0..pieces {
            let start = span.start + k as f64 * piece_len;
            let end = if k + 1 == pieces { span.end } else { start + piece_len };
            limited.push(SpeechSpan::new(start, end));
        }
    }

    limited
}

/// Serialize spans to a JSON timestamp cache.
pub fn save_timestamps(spans: &[SpeechSpan], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(spans).map_err(|e| {
        SottoError::Vad(ErrorDetails::new("Failed to serialize VAD timestamps").with_cause(e))
    })?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load spans from a JSON timestamp cache.
pub fn load_timestamps(path: &Path) -> Result<Vec<SpeechSpan>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        SottoError::Vad(
            ErrorDetails::new(format!("Invalid VAD timestamp file '{}'", path.display()))
                .with_cause(e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn probs(pattern: &[(usize, f32)]) -> Vec<f32> {
        pattern
            .iter()
            .flat_map(|&(count, p)| std::iter::repeat(p).take(count))
            .collect()
    }

    #[test]
    fn single_span_detected() {
        // ~1s silence, ~2s speech, ~1s silence (31.25 frames/s at 512/16k)
        let p = probs(&[(31, 0.1), (62, 0.9), (31, 0.1)]);
        let spans = spans_from_probabilities(&p, VAD_FRAME_SIZE, RATE, 0.5, 500, 250);
        assert_eq!(spans.len(), 1);
        let (start, end) = spans[0];
        assert_eq!(start, 31 * VAD_FRAME_SIZE);
        assert_eq!(end, 93 * VAD_FRAME_SIZE);
    }

    #[test]
    fn brief_silence_does_not_close_span() {
        // 100ms dip (3 frames) inside speech with min_silence 500ms
        let p = probs(&[(31, 0.9), (3, 0.1), (31, 0.9), (31, 0.05)]);
        let spans = spans_from_probabilities(&p, VAD_FRAME_SIZE, RATE, 0.5, 500, 250);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn short_blips_are_dropped() {
        // One frame (32ms) of speech with min_speech 250ms
        let p = probs(&[(31, 0.1), (1, 0.9), (31, 0.1)]);
        let spans = spans_from_probabilities(&p, VAD_FRAME_SIZE, RATE, 0.5, 500, 250);
        assert!(spans.is_empty());
    }

    #[test]
    fn span_open_at_stream_end_is_closed() {
        let p = probs(&[(31, 0.1), (31, 0.9)]);
        let spans = spans_from_probabilities(&p, VAD_FRAME_SIZE, RATE, 0.5, 500, 250);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].1, 62 * VAD_FRAME_SIZE);
    }

    #[test]
    fn padding_is_applied_and_clamped() {
        // Span [0.4s, 3.0s] in a 3.2s file with 250ms padding
        let spans = [(6_400usize, 48_000usize)];
        let result = normalize_and_limit(&spans, RATE, 3.2, 250, 40.0);
        assert_eq!(result.len(), 1);
        assert!((result[0].start - 0.15).abs() < 1e-9);
        assert!((result[0].end - 3.2).abs() < 1e-9, "end clamped to duration");
    }

    #[test]
    fn touching_spans_merge() {
        // [1.0, 2.0] and [2.4, 3.0] with 250ms pad -> [0.75, 2.25] and [2.15, 3.25]: overlap
        let spans = [(16_000usize, 32_000usize), (38_400usize, 48_000usize)];
        let result = normalize_and_limit(&spans, RATE, 10.0, 250, 40.0);
        assert_eq!(result.len(), 1);
        assert!((result[0].start - 0.75).abs() < 1e-9);
        assert!((result[0].end - 3.25).abs() < 1e-9);
    }

    #[test]
    fn disjoint_spans_stay_separate_and_sorted() {
        let spans = [(160_000usize, 192_000usize), (16_000usize, 32_000usize)];
        let result = normalize_and_limit(&spans, RATE, 20.0, 0, 40.0);
        assert_eq!(result.len(), 2);
        assert!(result[0].start < result[1].start);
        assert!(result[0].end <= result[1].start);
    }

    #[test]
    fn oversize_span_splits_into_equal_pieces() {
        // 90s span with a 40s limit -> 3 pieces of 30s
        let spans = [(0usize, 90 * RATE as usize)];
        let result = normalize_and_limit(&spans, RATE, 90.0, 0, 40.0);
        assert_eq!(result.len(), 3);
        for piece in &result {
            assert!(piece.duration() <= 40.0 + 1e-9);
            assert!((piece.duration() - 30.0).abs() < 1e-6);
        }
        assert_eq!(result[0].start, 0.0);
        assert!((result[2].end - 90.0).abs() < 1e-9);
    }

    #[test]
    fn all_output_spans_are_ordered_and_positive() {
        let spans = [(0usize, 800_000usize), (900_000usize, 1_000_000usize)];
        let result = normalize_and_limit(&spans, RATE, 100.0, 250, 40.0);
        for window in result.windows(2) {
            assert!(window[0].start <= window[1].start);
        }
        for span in &result {
            assert!(span.start >= 0.0);
            assert!(span.end > span.start);
            assert!(span.end <= 100.0);
        }
    }

    #[test]
    fn timestamps_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vad_timestamps.json");
        let spans = vec![SpeechSpan::new(0.5, 3.2), SpeechSpan::new(4.0, 7.5)];
        save_timestamps(&spans, &path).unwrap();
        let loaded = load_timestamps(&path).unwrap();
        assert_eq!(loaded, spans);
    }
}
