//! Progress tracking for transcription workflows.
//!
//! A `ProgressTracker` fans pipeline events out to whatever is attached
//! (a terminal renderer, a GUI callback, or nothing) without the pipeline
//! knowing which. `TranscriptionProgress` layers semantic helpers
//! (decode/vad/condense/transcribe/refine) on top.

use std::sync::Mutex;
use std::time::Instant;

/// Opaque handle for one progress step.
pub type TaskId = u64;

/// Abstract progress surface used by pipeline components.
pub trait ProgressTracker: Send + Sync {
    /// Add a progress step. `total` is `None` for indeterminate work.
    fn add_step(&self, description: &str, total: Option<u64>) -> TaskId;

    /// Update a step's description and/or completion count.
    fn update(&self, task_id: TaskId, description: Option<&str>, completed: Option<u64>);

    /// Advance a step's completion count.
    fn advance(&self, task_id: TaskId, amount: u64);

    /// Mark a step finished.
    fn complete(&self, task_id: TaskId);

    /// Print a message without disrupting the progress display.
    fn print(&self, message: &str, style: Option<&str>);

    /// Acquire the display (spinners, alternate screen). Paired with
    /// `finish` on all exit paths.
    fn start(&self) {}

    /// Release the display.
    fn finish(&self) {}
}

/// No-op tracker for silent/batch mode.
pub struct NullProgressTracker;

impl ProgressTracker for NullProgressTracker {
    fn add_step(&self, _description: &str, _total: Option<u64>) -> TaskId {
        0
    }
    fn update(&self, _task_id: TaskId, _description: Option<&str>, _completed: Option<u64>) {}
    fn advance(&self, _task_id: TaskId, _amount: u64) {}
    fn complete(&self, _task_id: TaskId) {}
    fn print(&self, _message: &str, _style: Option<&str>) {}
}

/// One progress event delivered to a GUI callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Stage identifier (decode, preprocess, vad, transcribe, refine,
    /// condense, processing, info)
    pub stage: String,
    /// Progress in [0, 1], or `None` for indeterminate work
    pub progress: Option<f64>,
    /// Markup-free status message
    pub message: String,
    pub elapsed_s: Option<f64>,
    pub remaining_s: Option<f64>,
}

/// Callback signature for GUI consumers.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

struct CallbackTask {
    id: TaskId,
    stage: String,
    description: String,
    total: Option<u64>,
    completed: u64,
    started: Instant,
}

/// Tracker that forwards every event to a callback, letting GUIs update
/// their own widgets without a UI-framework dependency here.
pub struct CallbackProgressTracker {
    callback: ProgressCallback,
    tasks: Mutex<Vec<CallbackTask>>,
    next_id: Mutex<TaskId>,
}

impl CallbackProgressTracker {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            tasks: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    fn emit(&self, task: &CallbackTask) {
        let progress = task
            .total
            .filter(|&t| t > 0)
            .map(|t| (task.completed as f64 / t as f64).clamp(0.0, 1.0));
        (self.callback)(ProgressUpdate {
            stage: task.stage.clone(),
            progress,
            message: strip_markup(&task.description),
            elapsed_s: Some(task.started.elapsed().as_secs_f64()),
            remaining_s: None,
        });
    }
}

impl ProgressTracker for CallbackProgressTracker {
    fn add_step(&self, description: &str, total: Option<u64>) -> TaskId {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let task = CallbackTask {
            id,
            stage: extract_stage(description).to_string(),
            description: description.to_string(),
            total,
            completed: 0,
            started: Instant::now(),
        };
        (self.callback)(ProgressUpdate {
            stage: task.stage.clone(),
            progress: total.map(|_| 0.0),
            message: strip_markup(description),
            elapsed_s: Some(0.0),
            remaining_s: None,
        });
        self.tasks.lock().unwrap().push(task);
        id
    }

    fn update(&self, task_id: TaskId, description: Option<&str>, completed: Option<u64>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            if let Some(desc) = description {
                task.description = desc.to_string();
            }
            if let Some(done) = completed {
                task.completed = done;
            }
            let snapshot = CallbackTask {
                id: task.id,
                stage: task.stage.clone(),
                description: task.description.clone(),
                total: task.total,
                completed: task.completed,
                started: task.started,
            };
            drop(tasks);
            self.emit(&snapshot);
        }
    }

    fn advance(&self, task_id: TaskId, amount: u64) {
        let completed = {
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.iter_mut().find(|t| t.id == task_id) {
                Some(task) => {
                    task.completed += amount;
                    Some(task.completed)
                }
                None => None,
            }
        };
        if let Some(done) = completed {
            self.update(task_id, None, Some(done));
        }
    }

    fn complete(&self, task_id: TaskId) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(pos) = tasks.iter().position(|t| t.id == task_id) {
            let task = tasks.remove(pos);
            drop(tasks);
            (self.callback)(ProgressUpdate {
                stage: task.stage.clone(),
                progress: Some(1.0),
                message: strip_markup(&task.description),
                elapsed_s: Some(task.started.elapsed().as_secs_f64()),
                remaining_s: None,
            });
        }
    }

    fn print(&self, message: &str, _style: Option<&str>) {
        let stage = self
            .tasks
            .lock()
            .unwrap()
            .first()
            .map(|t| t.stage.clone())
            .unwrap_or_else(|| "info".to_string());
        (self.callback)(ProgressUpdate {
            stage,
            progress: None,
            message: strip_markup(message),
            elapsed_s: None,
            remaining_s: None,
        });
    }
}

/// Derive a stage name from a step description.
///
/// Order matters: "transcribe" is checked before "condense" because
/// "Transcribing 3 chunks" contains both keywords.
pub fn extract_stage(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    if lower.contains("decod") {
        "decode"
    } else if lower.contains("preprocess") {
        "preprocess"
    } else if lower.contains("vad") || lower.contains("speech") || lower.contains("segment") {
        "vad"
    } else if lower.contains("transcrib") {
        "transcribe"
    } else if lower.contains("refin") {
        "refine"
    } else if lower.contains("condens") || lower.contains("chunk") || lower.contains("split") {
        "condense"
    } else {
        "processing"
    }
}

/// Remove `[style]…[/style]` markup for GUI consumption.
pub fn strip_markup(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut depth = 0usize;
    for ch in message.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Semantic progress helpers over a `ProgressTracker`.
pub struct TranscriptionProgress<'a> {
    tracker: &'a dyn ProgressTracker,
    current: Mutex<Option<TaskId>>,
}

impl<'a> TranscriptionProgress<'a> {
    pub fn new(tracker: &'a dyn ProgressTracker) -> Self {
        Self {
            tracker,
            current: Mutex::new(None),
        }
    }

    fn begin(&self, description: &str, total: Option<u64>) {
        self.end();
        let id = self.tracker.add_step(description, total);
        *self.current.lock().unwrap() = Some(id);
    }

    fn end(&self) {
        if let Some(id) = self.current.lock().unwrap().take() {
            self.tracker.complete(id);
        }
    }

    pub fn start_decode(&self) {
        self.begin("Decoding audio...", None);
    }

    pub fn complete_decode(&self) {
        self.end();
    }

    pub fn start_preprocess(&self) {
        self.begin("Preprocessing audio...", None);
    }

    pub fn complete_preprocess(&self) {
        self.end();
    }

    pub fn start_vad(&self) {
        self.begin("Detecting speech...", None);
    }

    pub fn complete_vad(&self, segment_count: usize) {
        self.end();
        self.tracker.print(&format!("Found {} speech segments", segment_count), None);
    }

    pub fn start_condense(&self) {
        self.begin("Condensing speech...", None);
    }

    pub fn complete_condense(&self, chunk_count: usize) {
        self.end();
        self.tracker.print(&format!("Condensed into {} chunks", chunk_count), None);
    }

    pub fn start_transcribe(&self, chunk_count: usize) {
        self.begin(
            &format!("Transcribing {} chunks...", chunk_count),
            Some(chunk_count as u64),
        );
    }

    pub fn complete_transcribe(&self) {
        self.end();
    }

    pub fn start_refine(&self) {
        self.begin("Refining transcript...", None);
    }

    pub fn complete_refine(&self) {
        self.end();
    }

    pub fn success(&self, message: &str) {
        self.tracker.print(message, Some("green"));
    }

    pub fn warning(&self, message: &str) {
        self.tracker.print(message, Some("yellow"));
    }

    pub fn error(&self, message: &str) {
        self.tracker.print(message, Some("red"));
    }
}

impl Drop for TranscriptionProgress<'_> {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn stage_extraction_keyword_order() {
        assert_eq!(extract_stage("Decoding audio..."), "decode");
        assert_eq!(extract_stage("Preprocessing audio..."), "preprocess");
        assert_eq!(extract_stage("Detecting speech..."), "vad");
        assert_eq!(extract_stage("Refining transcript..."), "refine");
        assert_eq!(extract_stage("Splitting into chunks"), "condense");
        assert_eq!(extract_stage("Doing something else"), "processing");
        // transcribe wins over condense for mixed descriptions
        assert_eq!(extract_stage("Transcribing 3 chunks..."), "transcribe");
    }

    #[test]
    fn markup_is_stripped() {
        assert_eq!(strip_markup("[cyan]Transcribing a.wav[/cyan]"), "Transcribing a.wav");
        assert_eq!(strip_markup("no markup here"), "no markup here");
        assert_eq!(strip_markup("[green]done[/green] [1/3]"), "done");
    }

    fn collecting_tracker() -> (CallbackProgressTracker, Arc<Mutex<Vec<ProgressUpdate>>>) {
        let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let tracker = CallbackProgressTracker::new(Box::new(move |update| {
            sink.lock().unwrap().push(update);
        }));
        (tracker, updates)
    }

    #[test]
    fn callback_tracker_emits_lifecycle_events() {
        let (tracker, updates) = collecting_tracker();

        let id = tracker.add_step("Transcribing 3 chunks...", Some(3));
        tracker.advance(id, 1);
        tracker.advance(id, 1);
        tracker.complete(id);

        let updates = updates.lock().unwrap();
        assert_eq!(updates.first().unwrap().progress, Some(0.0));
        assert_eq!(updates.first().unwrap().stage, "transcribe");
        let mid = &updates[1];
        assert!((mid.progress.unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(updates.last().unwrap().progress, Some(1.0));
    }

    #[test]
    fn indeterminate_steps_have_no_progress() {
        let (tracker, updates) = collecting_tracker();
        let id = tracker.add_step("Decoding audio...", None);
        tracker.update(id, Some("Decoding audio... still"), None);
        let updates = updates.lock().unwrap();
        assert!(updates.iter().all(|u| u.progress.is_none()));
    }

    #[test]
    fn print_uses_active_stage() {
        let (tracker, updates) = collecting_tracker();
        let _id = tracker.add_step("Detecting speech...", None);
        tracker.print("[yellow]low volume[/yellow]", Some("yellow"));
        let updates = updates.lock().unwrap();
        let last = updates.last().unwrap();
        assert_eq!(last.stage, "vad");
        assert_eq!(last.message, "low volume");
    }

    #[test]
    fn transcription_progress_closes_previous_step() {
        let (tracker, updates) = collecting_tracker();
        {
            let progress = TranscriptionProgress::new(&tracker);
            progress.start_decode();
            progress.start_vad(); // implicitly completes decode
            progress.complete_vad(4);
        }
        let updates = updates.lock().unwrap();
        let decode_done = updates
            .iter()
            .any(|u| u.stage == "decode" && u.progress == Some(1.0));
        assert!(decode_done, "decode step must be completed when vad starts");
    }
}
