use std::path::PathBuf;

use sotto_core::engine::EngineWorker;
use sotto_core::sinks::{FileSink, Sink, StdoutSink};
use sotto_core::sources::FileSource;
use sotto_core::workflow::{WorkflowOptions, transcribe_file_workflow};
use sotto_core::Result;

use crate::args::{EngineOptions, SegmentationOptions};
use crate::commands::{build_engine_profile, build_segmentation_profile};
use crate::ui::TermProgressTracker;

pub fn run(
    input: PathBuf,
    output: Option<PathBuf>,
    timestamps: bool,
    no_daemon: bool,
    engine: EngineOptions,
    segmentation: SegmentationOptions,
) -> Result<()> {
    let engine_profile = build_engine_profile(&engine)?;
    let segmentation_profile = build_segmentation_profile(&segmentation)?;

    let mut worker = EngineWorker::new(engine_profile.clone());
    if no_daemon {
        worker = worker.without_daemon();
    }

    let tracker = TermProgressTracker::new();
    let options = WorkflowOptions::default();
    let result = transcribe_file_workflow(
        &FileSource::new(&input),
        &engine_profile,
        &segmentation_profile,
        &options,
        Some(&mut worker),
        Some(&tracker),
    )?;

    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }

    let mut sink: Box<dyn Sink> = match output {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(StdoutSink::new(timestamps)),
    };
    for segment in &result.segments {
        sink.handle_segment(segment)?;
    }
    sink.complete(&result)?;
    Ok(())
}
