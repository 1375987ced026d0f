//! Condense speech spans into engine-sized chunk files.
//!
//! Takes the VAD timestamp list plus the decoded source WAV and emits one
//! or more chunk WAVs, each bounded by `max_chunk_s`. Non-speech sections
//! are elided; concatenating the chunks reproduces the spoken audio in
//! original order.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::SegmentationProfile;
use crate::domain::SpeechSpan;
use crate::error::{ErrorDetails, Result, SottoError};

/// Extra audio kept around each span boundary when cutting (seconds).
pub const BOUNDARY_MARGIN_S: f64 = 0.25;

/// Condenser that shells out to ffmpeg for the actual cutting.
pub struct Condenser {
    ffmpeg_path: String,
}

impl Condenser {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    /// Condense `audio_path` according to `spans`, writing chunk files
    /// named `<stem>_condensed_part_NNN.wav` into `output_dir` (defaults
    /// to the audio file's directory).
    pub fn condense(
        &self,
        spans: &[SpeechSpan],
        audio_path: &Path,
        profile: &SegmentationProfile,
        output_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let groups = plan_chunks(spans, profile.max_chunk_s, profile.chunk_search_start_s, profile.min_gap_for_split_s)?;
        self.cut_groups(&groups, audio_path, output_dir)
    }

    /// Condense into exactly one file at `output_path` (splitting disabled).
    pub fn condense_to_single(
        &self,
        spans: &[SpeechSpan],
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<PathBuf> {
        if spans.is_empty() {
            return Err(SottoError::Vad(ErrorDetails::new(
                "Cannot condense an empty span list",
            )));
        }
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.cut_one(spans, audio_path, output_path)?;
        Ok(output_path.to_path_buf())
    }

    fn cut_groups(
        &self,
        groups: &[Vec<SpeechSpan>],
        audio_path: &Path,
        output_dir: Option<&Path>,
    ) -> Result<Vec<PathBuf>> {
        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let dir = match output_dir {
            Some(d) => d.to_path_buf(),
            None => audio_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
        };
        std::fs::create_dir_all(&dir)?;

        let mut outputs = Vec::with_capacity(groups.len());
        for (k, group) in groups.iter().enumerate() {
            let output = dir.join(format!("{}_condensed_part_{:03}.wav", stem, k + 1));
            self.cut_one(group, audio_path, &output)?;
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Cut one chunk: a single ffmpeg filter-graph call that trims each
    /// span (widened by the boundary margin) and concatenates the pieces.
    fn cut_one(&self, spans: &[SpeechSpan], audio_path: &Path, output: &Path) -> Result<()> {
        let filter = build_filter_graph(spans, BOUNDARY_MARGIN_S);

        let result = Command::new(&self.ffmpeg_path)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(audio_path)
            .arg("-filter_complex")
            .arg(&filter)
            .arg("-map")
            .arg("[out]")
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
                ErrorDetails::new(format!("Condensing failed for '{}'", audio_path.display()))
                    .with_context("filter", filter)
                    .with_context("ffmpeg_exit_code", cmd_output.status.code().unwrap_or(-1))
                    .with_context("stderr", stderr.chars().take(300).collect::<String>())
                    .with_suggestion("Check the source WAV decodes cleanly"),
            ));
        }
        Ok(())
    }
}

impl Default for Condenser {
    fn default() -> Self {
        Self::new()
    }
}

/// Group spans into chunks bounded by `max_chunk_s`.
///
/// Spans accumulate into the current chunk until either (a) the chunk has
/// passed `chunk_search_start_s` and the next span sits behind a gap of at
/// least `min_gap_for_split_s`, or (b) adding the next span would exceed
/// `max_chunk_s`. A single span longer than `max_chunk_s` has no legal
/// split and is an error.
pub fn plan_chunks(
    spans: &[SpeechSpan],
    max_chunk_s: f64,
    chunk_search_start_s: f64,
    min_gap_for_split_s: f64,
) -> Result<Vec<Vec<SpeechSpan>>> {
    let mut groups: Vec<Vec<SpeechSpan>> = Vec::new();
    let mut current: Vec<SpeechSpan> = Vec::new();
    let mut current_len = 0.0f64;

    for span in spans {
        let span_len = span.duration();
        if span_len > max_chunk_s {
            return Err(SottoError::unsplittable_segment(span.start, span.end, max_chunk_s));
        }

        if !current.is_empty() {
            let gap = span.start - current.last().map(|s| s.end).unwrap_or(span.start);
            let past_search_start = current_len >= chunk_search_start_s;
            let would_exceed = current_len + span_len > max_chunk_s;

            if (past_search_start && gap >= min_gap_for_split_s) || would_exceed {
                groups.push(std::mem::take(&mut current));
                current_len = 0.0;
            }
        }

        current_len += span_len;
        current.push(*span);
    }

    if !current.is_empty() {
        groups.push(current);
    }
    Ok(groups)
}

/// Build the ffmpeg filter graph that cuts and joins the spans.
fn build_filter_graph(spans: &[SpeechSpan], margin_s: f64) -> String {
    let mut parts = Vec::with_capacity(spans.len() + 1);
    for (i, span) in spans.iter().enumerate() {
        let start = (span.start - margin_s).max(0.0);
        let end = span.end + margin_s;
        parts.push(format!(
            "[0:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS[s{}]",
            start, end, i
        ));
    }
    if spans.len() == 1 {
        // No concat needed; relabel the single trimmed stream
        return parts[0].replace("[s0]", "[out]");
    }
    let inputs: String = (0..spans.len()).map(|i| format!("[s{}]", i)).collect();
    parts.push(format!("{}concat=n={}:v=0:a=1[out]", inputs, spans.len()));
    parts.join(";")
}
