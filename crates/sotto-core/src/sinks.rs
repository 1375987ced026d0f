//! Transcript sinks.
//!
//! A sink receives segments as they arrive and the final result once at
//! the end. Failures during `complete` surface to the caller.

use std::path::PathBuf;

use crate::domain::{TranscriptSegment, TranscriptionResult};
use crate::error::Result;
use crate::refine::Refiner;

/// Destination for transcription output.
pub trait Sink {
    /// Called as segments arrive, in timeline order.
    fn handle_segment(&mut self, segment: &TranscriptSegment) -> Result<()>;

    /// Called once with the assembled result.
    fn complete(&mut self, result: &TranscriptionResult) -> Result<()>;
}

/// Writes segments and final text to stdout.
pub struct StdoutSink {
    show_timestamps: bool,
}

impl StdoutSink {
    pub fn new(show_timestamps: bool) -> Self {
        Self { show_timestamps }
    }
}

impl Sink for StdoutSink {
    fn handle_segment(&mut self, segment: &TranscriptSegment) -> Result<()> {
        if self.show_timestamps {
            println!("{:.2}-{:.2}: {}", segment.start_s, segment.end_s, segment.text());
        }
        Ok(())
    }

    fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
        if self.show_timestamps {
            println!("\n=== Transcript ===");
        }
        println!("{}", result.text);
        Ok(())
    }
}

/// Writes the final transcript to a text file.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Sink for FileSink {
    fn handle_segment(&mut self, _segment: &TranscriptSegment) -> Result<()> {
        Ok(())
    }

    fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, &result.text)?;
        crate::verbose!("Wrote transcript to {}", self.path.display());
        Ok(())
    }
}

/// Copies the final transcript to the system clipboard.
#[cfg(feature = "clipboard")]
pub struct ClipboardSink;

#[cfg(feature = "clipboard")]
impl Sink for ClipboardSink {
    fn handle_segment(&mut self, _segment: &TranscriptSegment) -> Result<()> {
        Ok(())
    }

    fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
        use crate::error::{ErrorDetails, SottoError};
        let mut clipboard = arboard::Clipboard::new().map_err(|e| {
            SottoError::Dependency(
                ErrorDetails::new("Clipboard unavailable")
                    .with_cause(e)
                    .with_suggestion("On Wayland, ensure wl-clipboard support is present"),
            )
        })?;
        clipboard.set_text(result.text.clone()).map_err(|e| {
            SottoError::Dependency(ErrorDetails::new("Clipboard write failed").with_cause(e))
        })?;
        crate::verbose!("Transcript copied to clipboard");
        Ok(())
    }
}

/// Persists the whole result into the transcript history.
#[cfg(feature = "history")]
pub struct HistorySink {
    storage: Box<dyn crate::history::HistoryStorage>,
    source_path: Option<PathBuf>,
}

#[cfg(feature = "history")]
impl HistorySink {
    pub fn new(storage: Box<dyn crate::history::HistoryStorage>, source_path: Option<PathBuf>) -> Self {
        Self { storage, source_path }
    }
}

#[cfg(feature = "history")]
impl Sink for HistorySink {
    fn handle_segment(&mut self, _segment: &TranscriptSegment) -> Result<()> {
        Ok(())
    }

    fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
        let record =
            crate::history::HistoryRecord::from_result(result, self.source_path.as_deref());
        self.storage.append(&record)
    }
}

/// Wraps a sink so the final text is refined before forwarding.
pub struct RefiningSink {
    inner: Box<dyn Sink>,
    refiner: Box<dyn Refiner>,
}

impl RefiningSink {
    pub fn new(inner: Box<dyn Sink>, refiner: Box<dyn Refiner>) -> Self {
        Self { inner, refiner }
    }
}

impl Sink for RefiningSink {
    fn handle_segment(&mut self, segment: &TranscriptSegment) -> Result<()> {
        self.inner.handle_segment(segment)
    }

    fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
        let mut refined = result.clone();
        refined.text = self.refiner.refine(&result.text, None)?;
        self.inner.complete(&refined)
    }
}

/// Fan-out to multiple sinks, order preserved.
pub struct CompositeSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }
}

impl Sink for CompositeSink {
    fn handle_segment(&mut self, segment: &TranscriptSegment) -> Result<()> {
        for sink in &mut self.sinks {
            sink.handle_segment(segment)?;
        }
        Ok(())
    }

    fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
        for sink in &mut self.sinks {
            sink.complete(result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EngineMetadata;
    use std::sync::{Arc, Mutex};

    fn sample_result(text: &str) -> TranscriptionResult {
        let meta = EngineMetadata {
            model_name: "m".into(),
            device: "cpu".into(),
            precision: "fp32".into(),
        };
        TranscriptionResult::from_segments(
            vec![TranscriptSegment::new("s0", 0.0, 1.0, text)],
            &meta,
            "whisper_turbo",
            vec![],
        )
    }

    struct RecordingSink {
        segments: Arc<Mutex<Vec<String>>>,
        completed: Arc<Mutex<Vec<String>>>,
    }

    impl Sink for RecordingSink {
        fn handle_segment(&mut self, segment: &TranscriptSegment) -> Result<()> {
            self.segments.lock().unwrap().push(segment.text().to_string());
            Ok(())
        }

        fn complete(&mut self, result: &TranscriptionResult) -> Result<()> {
            self.completed.lock().unwrap().push(result.text.clone());
            Ok(())
        }
    }

    #[test]
    fn file_sink_writes_full_text_on_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/transcript.txt");
        let mut sink = FileSink::new(&path);

        let result = sample_result("final transcript");
        sink.handle_segment(&result.segments[0]).unwrap();
        assert!(!path.exists(), "nothing written before complete");

        sink.complete(&result).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "final transcript");
    }

    #[test]
    fn composite_fans_out_in_order() {
        let first_done: Arc<Mutex<Vec<String>>> = Arc::default();
        let second_done: Arc<Mutex<Vec<String>>> = Arc::default();
        let mut composite = CompositeSink::new(vec![
            Box::new(RecordingSink {
                segments: Arc::default(),
                completed: Arc::clone(&first_done),
            }),
            Box::new(RecordingSink {
                segments: Arc::default(),
                completed: Arc::clone(&second_done),
            }),
        ]);

        composite.complete(&sample_result("fan out")).unwrap();
        assert_eq!(first_done.lock().unwrap().as_slice(), ["fan out"]);
        assert_eq!(second_done.lock().unwrap().as_slice(), ["fan out"]);
    }

    #[test]
    fn refining_sink_refines_before_forwarding() {
        struct Upper;
        impl Refiner for Upper {
            fn refine(&self, text: &str, _i: Option<&str>) -> Result<String> {
                Ok(text.to_uppercase())
            }
        }

        let completed: Arc<Mutex<Vec<String>>> = Arc::default();
        let inner = RecordingSink {
            segments: Arc::default(),
            completed: Arc::clone(&completed),
        };
        let mut sink = RefiningSink::new(Box::new(inner), Box::new(Upper));

        sink.complete(&sample_result("quiet text")).unwrap();
        assert_eq!(completed.lock().unwrap().as_slice(), ["QUIET TEXT"]);
    }

    #[test]
    fn refining_sink_failure_surfaces() {
        struct Failing;
        impl Refiner for Failing {
            fn refine(&self, _t: &str, _i: Option<&str>) -> Result<String> {
                Err(crate::error::SottoError::refinement_output_invalid(5, 0, "empty"))
            }
        }
        let inner = RecordingSink {
            segments: Arc::default(),
            completed: Arc::default(),
        };
        let mut sink = RefiningSink::new(Box::new(inner), Box::new(Failing));
        assert!(sink.complete(&sample_result("x")).is_err());
    }

    #[cfg(feature = "history")]
    #[test]
    fn history_sink_persists_result() {
        let dir = tempfile::tempdir().unwrap();
        let storage = crate::history::SqliteHistory::new(dir.path().join("h.db"));
        let mut sink = HistorySink::new(
            Box::new(crate::history::SqliteHistory::new(dir.path().join("h.db"))),
            None,
        );
        sink.complete(&sample_result("kept for history")).unwrap();

        let recent = storage.recent(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].transcript, "kept for history");
    }
}
