//! Terminal progress rendering over indicatif.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use sotto_core::progress::{ProgressTracker, TaskId, strip_markup};

/// Terminal tracker: spinners for indeterminate steps, bars for counted
/// ones.
pub struct TermProgressTracker {
    multi: MultiProgress,
    bars: Mutex<HashMap<TaskId, ProgressBar>>,
    next_id: Mutex<TaskId>,
}

impl TermProgressTracker {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Default for TermProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for TermProgressTracker {
    fn add_step(&self, description: &str, total: Option<u64>) -> TaskId {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };

        let bar = match total {
            Some(total) => {
                let bar = self.multi.add(ProgressBar::new(total));
                bar.set_style(Self::bar_style());
                bar
            }
            None => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::spinner_style());
                bar
            }
        };
        bar.set_message(strip_markup(description));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bars.lock().unwrap().insert(id, bar);
        id
    }

    fn update(&self, task_id: TaskId, description: Option<&str>, completed: Option<u64>) {
        let bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.get(&task_id) {
            if let Some(desc) = description {
                bar.set_message(strip_markup(desc));
            }
            if let Some(done) = completed {
                bar.set_position(done);
            }
        }
    }

    fn advance(&self, task_id: TaskId, amount: u64) {
        let bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.get(&task_id) {
            bar.inc(amount);
        }
    }

    fn complete(&self, task_id: TaskId) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.remove(&task_id) {
            bar.finish_and_clear();
        }
    }

    fn print(&self, message: &str, _style: Option<&str>) {
        let _ = self.multi.println(strip_markup(message));
    }

    fn finish(&self) {
        let mut bars = self.bars.lock().unwrap();
        for (_, bar) in bars.drain() {
            bar.finish_and_clear();
        }
    }
}
