use std::time::Duration;

use sotto_core::server::protocol::log_file_path;
use sotto_core::server::{DaemonConfig, DaemonManager, get_daemon_pid, run_daemon};
use sotto_core::Result;

use crate::args::{DaemonAction, EngineOptions};
use crate::commands::build_engine_profile;
use crate::ui::TermProgressTracker;

pub fn run(action: DaemonAction) -> Result<()> {
    match action {
        DaemonAction::Start { engine } => start(engine),
        DaemonAction::Stop => stop(),
        DaemonAction::Status => status(),
        DaemonAction::Logs { lines } => logs(lines),
        DaemonAction::Run { host, port, engine } => run_foreground(host, port, engine),
    }
}

fn start(engine: EngineOptions) -> Result<()> {
    let manager = manager_for(&engine)?;
    if manager.is_running() {
        println!("Daemon is already running (PID: {:?})", get_daemon_pid());
        return Ok(());
    }

    let tracker = TermProgressTracker::new();
    let pid = manager.start_sync(Duration::from_secs(120), Some(&tracker))?;
    println!("Daemon started (PID: {})", pid);
    Ok(())
}

fn stop() -> Result<()> {
    let manager = DaemonManager::default();
    if manager.stop(Duration::from_secs(10)) {
        println!("Daemon stopped");
    } else {
        println!("Daemon was not running");
    }
    Ok(())
}

fn status() -> Result<()> {
    let manager = DaemonManager::default();
    match manager.client().status() {
        Ok(status) => {
            println!("Status:           {}", status.status);
            println!("Model loaded:     {}", status.model_loaded);
            println!("Model:            {}", status.model_name);
            println!("Device:           {}", status.device);
            println!("Uptime:           {:.0}s", status.uptime_seconds);
            println!("Requests handled: {}", status.requests_handled);
            if let Some(pid) = get_daemon_pid() {
                println!("PID:              {}", pid);
            }
        }
        Err(e) => {
            println!("Daemon is not running ({})", e.message());
        }
    }
    Ok(())
}

fn logs(lines: usize) -> Result<()> {
    let path = log_file_path();
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    if content.is_empty() {
        println!("No daemon log at {}", path.display());
        return Ok(());
    }
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    for line in &all[start..] {
        println!("{}", line);
    }
    Ok(())
}

fn run_foreground(host: String, port: u16, engine: EngineOptions) -> Result<()> {
    let profile = build_engine_profile(&engine)?;
    let mut config = DaemonConfig::new(profile.kind, profile.config);
    config.host = host;
    config.port = port;
    run_daemon(config)
}

fn manager_for(engine: &EngineOptions) -> Result<DaemonManager> {
    // Validate the engine options now so a typo fails fast here rather
    // than inside the detached child.
    build_engine_profile(engine)?;

    let mut manager = DaemonManager::default();
    manager.daemon_args = vec![
        "--engine".into(),
        engine.engine.clone(),
        "--device".into(),
        engine.device.clone(),
        "--compute-type".into(),
        engine.compute_type.clone(),
    ];
    if let Some(model) = &engine.model {
        manager.daemon_args.extend(["--model".into(), model.clone()]);
    }
    if let Some(dir) = &engine.model_dir {
        manager
            .daemon_args
            .extend(["--model-dir".into(), dir.display().to_string()]);
    }
    Ok(manager)
}
