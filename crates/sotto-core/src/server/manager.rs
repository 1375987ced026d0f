//! Daemon lifecycle management with auto-start capability.
//!
//! The manager owns the PID file: it writes it when spawning the daemon
//! and removes it on stop and on stale-PID cleanup. A PID is considered
//! live iff `kill(pid, 0)` succeeds.

use std::process::{Command, Stdio};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{ErrorDetails, Result, SottoError};
use crate::progress::ProgressTracker;

use super::client::DaemonClient;
use super::protocol::{
    DEFAULT_DAEMON_HOST, DEFAULT_DAEMON_PORT, ensure_cache_dir, log_file_path, pid_file_path,
};

/// Typical model load time used for the startup progress estimate.
const NOMINAL_LOAD_SECS: f64 = 16.0;

/// Default time allowed for the daemon to become healthy.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);

/// True iff the process exists (signal 0 probe).
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) {
    unsafe {
        libc::kill(pid as libc::pid_t, signal);
    }
}

fn write_pid_file(pid: u32) -> Result<()> {
    ensure_cache_dir()?;
    std::fs::write(pid_file_path(), format!("{}\n", pid))?;
    Ok(())
}

fn remove_pid_file() {
    let _ = std::fs::remove_file(pid_file_path());
}

/// Read the daemon PID, removing the file when it is stale.
pub fn get_daemon_pid() -> Option<u32> {
    let raw = std::fs::read_to_string(pid_file_path()).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(pid) if pid_alive(pid) => Some(pid),
        _ => {
            remove_pid_file();
            None
        }
    }
}

fn log_excerpt() -> Option<String> {
    let content = std::fs::read_to_string(log_file_path()).ok()?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let tail = &lines[lines.len().saturating_sub(5)..];
    Some(tail.join("\n"))
}

/// Shared result cell for an asynchronous daemon startup.
///
/// The worker is a detached background thread that must not block process
/// exit; callers observe completion through this mutex+condvar cell.
pub struct AsyncStartupResult {
    cell: Arc<StartupCell>,
}

#[derive(Default)]
struct StartupState {
    complete: bool,
    success: Option<bool>,
    pid: Option<u32>,
    error: Option<String>,
}

#[derive(Default)]
struct StartupCell {
    state: Mutex<StartupState>,
    condvar: Condvar,
}

impl AsyncStartupResult {
    fn new() -> Self {
        Self {
            cell: Arc::new(StartupCell::default()),
        }
    }

    /// Whether startup is still in progress.
    pub fn is_running(&self) -> bool {
        !self.cell.state.lock().unwrap().complete
    }

    /// Whether startup has completed (success or failure).
    pub fn is_complete(&self) -> bool {
        self.cell.state.lock().unwrap().complete
    }

    /// `None` while in progress, then the outcome.
    pub fn success(&self) -> Option<bool> {
        self.cell.state.lock().unwrap().success
    }

    pub fn pid(&self) -> Option<u32> {
        self.cell.state.lock().unwrap().pid
    }

    pub fn error(&self) -> Option<String> {
        self.cell.state.lock().unwrap().error.clone()
    }

    /// Wait for completion. Returns `false` when the timeout elapses
    /// first; the startup thread is not cancelled.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.cell.state.lock().unwrap();
        while !state.complete {
            match deadline {
                None => state = self.cell.condvar.wait(state).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (next, timed_out) = self
                        .cell
                        .condvar
                        .wait_timeout(state, deadline - now)
                        .unwrap();
                    state = next;
                    if timed_out.timed_out() && !state.complete {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn finish(&self, success: bool, pid: Option<u32>, error: Option<String>) {
        let mut state = self.cell.state.lock().unwrap();
        state.complete = true;
        state.success = Some(success);
        state.pid = pid;
        state.error = error;
        self.cell.condvar.notify_all();
    }

    fn clone_handle(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Manages daemon lifecycle: health checks, auto-start, stop, restart.
pub struct DaemonManager {
    host: String,
    port: u16,
    client: DaemonClient,
    /// Extra arguments appended to `sotto daemon run` (engine selection)
    pub daemon_args: Vec<String>,
}

impl DaemonManager {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            client: DaemonClient::new(host, port),
            daemon_args: Vec::new(),
        }
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    /// Check if the daemon is running and healthy.
    pub fn is_running(&self) -> bool {
        self.client.ping()
    }

    pub fn get_pid(&self) -> Option<u32> {
        get_daemon_pid()
    }

    /// Ensure the daemon is running, optionally auto-starting it.
    ///
    /// Returns `true` when the daemon is (now) running; `false` when it is
    /// not and auto-start was disabled or failed.
    pub fn ensure_running(&self, auto_start: bool, progress: Option<&dyn ProgressTracker>) -> bool {
        if self.is_running() {
            crate::verbose!("Daemon is already running");
            return true;
        }
        if !auto_start {
            crate::verbose!("Daemon not running, auto-start disabled");
            return false;
        }

        if let Some(progress) = progress {
            progress.print("Daemon not running, starting automatically...", None);
        }
        match self.start_sync(DEFAULT_START_TIMEOUT, progress) {
            Ok(_) => true,
            Err(e) => {
                crate::error!("Failed to auto-start daemon: {}", e);
                if let Some(progress) = progress {
                    progress.print(&format!("Daemon auto-start failed: {}", e), Some("yellow"));
                }
                false
            }
        }
    }

    fn spawn_daemon_process(&self) -> Result<u32> {
        remove_pid_file();
        ensure_cache_dir()?;

        let exe = std::env::current_exe()?;
        let log = std::fs::File::create(log_file_path())?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(exe);
        command
            .arg("daemon")
            .arg("run")
            .arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string())
            .args(&self.daemon_args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // Detach from the controlling terminal so the daemon outlives us
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(|e| {
            SottoError::DaemonStart(
                ErrorDetails::new("Failed to spawn daemon process").with_cause(e),
            )
        })?;

        let pid = child.id();
        write_pid_file(pid)?;
        crate::verbose!("Started daemon process with PID {}", pid);
        Ok(pid)
    }

    /// Start the daemon and wait for it to become healthy.
    pub fn start_sync(&self, timeout: Duration, progress: Option<&dyn ProgressTracker>) -> Result<u32> {
        let task_id = progress.map(|p| p.add_step("Starting warm model daemon...", Some(100)));

        let pid = self.spawn_daemon_process()?;
        let started = Instant::now();
        let poll = Duration::from_secs(1);

        while started.elapsed() < timeout {
            std::thread::sleep(poll);

            if let (Some(progress), Some(task_id)) = (progress, task_id) {
                let pct = ((started.elapsed().as_secs_f64() / NOMINAL_LOAD_SECS) * 90.0).min(90.0);
                progress.update(task_id, None, Some(pct as u64));
            }

            if self.is_running() {
                if let (Some(progress), Some(task_id)) = (progress, task_id) {
                    progress.update(task_id, None, Some(100));
                    progress.complete(task_id);
                    progress.print(&format!("Daemon started successfully (PID: {})", pid), Some("green"));
                }
                crate::info!("Daemon started successfully (PID: {})", pid);
                return Ok(pid);
            }

            if !pid_alive(pid) {
                break;
            }
        }

        if let (Some(progress), Some(task_id)) = (progress, task_id) {
            progress.complete(task_id);
        }

        #[cfg(unix)]
        send_signal(pid, libc::SIGKILL);
        remove_pid_file();

        let mut details = ErrorDetails::new(format!(
            "Daemon failed to start within {}s",
            timeout.as_secs()
        ))
        .with_suggestion("Check 'sotto daemon logs' for the model load error");
        if let Some(excerpt) = log_excerpt() {
            details = details.with_context("log_excerpt", excerpt);
        }
        Err(SottoError::DaemonStart(details))
    }

    /// Start the daemon on a background thread (non-blocking).
    ///
    /// The callback receives `(message, elapsed_seconds)` during startup.
    pub fn start_async(
        &self,
        progress_callback: Option<Box<dyn Fn(&str, f64) + Send>>,
        timeout: Option<Duration>,
    ) -> AsyncStartupResult {
        let timeout = timeout.unwrap_or(DEFAULT_START_TIMEOUT);
        let result = AsyncStartupResult::new();
        let handle = result.clone_handle();
        let manager = DaemonManager {
            host: self.host.clone(),
            port: self.port,
            client: DaemonClient::new(&self.host, self.port),
            daemon_args: self.daemon_args.clone(),
        };

        std::thread::spawn(move || {
            let started = Instant::now();
            let report = |msg: &str| {
                if let Some(cb) = &progress_callback {
                    cb(msg, started.elapsed().as_secs_f64());
                }
            };

            report("Starting daemon...");
            let pid = match manager.spawn_daemon_process() {
                Ok(pid) => pid,
                Err(e) => {
                    let msg = format!("Failed to start daemon process: {}", e);
                    report(&msg);
                    handle.finish(false, None, Some(msg));
                    return;
                }
            };

            report("Loading model...");
            while started.elapsed() < timeout {
                std::thread::sleep(Duration::from_secs(1));
                if manager.is_running() {
                    report("Daemon ready");
                    handle.finish(true, Some(pid), None);
                    return;
                }
                report("Loading model...");
            }

            #[cfg(unix)]
            send_signal(pid, libc::SIGKILL);
            remove_pid_file();
            let msg = format!("Daemon failed to start within {}s", timeout.as_secs());
            report(&msg);
            handle.finish(false, None, Some(msg));
        });

        result
    }

    /// Stop the daemon gracefully: SIGTERM, poll, then SIGKILL. The PID
    /// file is always removed.
    pub fn stop(&self, timeout: Duration) -> bool {
        let Some(pid) = get_daemon_pid() else {
            if self.is_running() {
                crate::warn!("Daemon is running but PID file not found");
                return false;
            }
            return true;
        };

        crate::info!("Stopping daemon (PID: {})...", pid);

        #[cfg(unix)]
        send_signal(pid, libc::SIGTERM);

        let started = Instant::now();
        while started.elapsed() < timeout {
            std::thread::sleep(Duration::from_millis(500));
            if !pid_alive(pid) {
                remove_pid_file();
                crate::info!("Daemon stopped");
                return true;
            }
        }

        crate::warn!("Daemon did not stop gracefully, force killing...");
        #[cfg(unix)]
        send_signal(pid, libc::SIGKILL);
        remove_pid_file();
        true
    }

    /// Restart: stop then start.
    pub fn restart(&self, timeout: Duration, progress: Option<&dyn ProgressTracker>) -> Result<u32> {
        self.stop(Duration::from_secs(10));
        self.start_sync(timeout, progress)
    }
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new(DEFAULT_DAEMON_HOST, DEFAULT_DAEMON_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn nonexistent_pid_is_dead() {
        // PID near the usual pid_max; overwhelmingly unlikely to exist
        assert!(!pid_alive(4_000_000));
    }

    #[test]
    fn async_result_wait_times_out_before_completion() {
        let result = AsyncStartupResult::new();
        assert!(result.is_running());
        assert!(!result.wait(Some(Duration::from_millis(50))));
        assert!(result.success().is_none());
    }

    #[test]
    fn async_result_wait_returns_after_finish() {
        let result = AsyncStartupResult::new();
        let handle = result.clone_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.finish(true, Some(1234), None);
        });
        assert!(result.wait(Some(Duration::from_secs(5))));
        assert!(result.is_complete());
        assert_eq!(result.success(), Some(true));
        assert_eq!(result.pid(), Some(1234));
        assert!(result.error().is_none());
    }

    #[test]
    fn async_result_records_failure() {
        let result = AsyncStartupResult::new();
        result.finish(false, None, Some("boom".into()));
        assert_eq!(result.success(), Some(false));
        assert_eq!(result.error().as_deref(), Some("boom"));
    }
}
