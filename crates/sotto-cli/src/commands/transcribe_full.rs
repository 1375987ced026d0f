use std::path::PathBuf;

use sotto_core::audio::PreprocessingConfig;
use sotto_core::engine::EngineWorker;
use sotto_core::refine::{OllamaRefiner, RefinementMode};
use sotto_core::sinks::{CompositeSink, FileSink, Sink, StdoutSink};
use sotto_core::sources::FileSource;
use sotto_core::workflow::{WorkflowOptions, transcribe_file_workflow};
use sotto_core::Result;

use crate::args::{EngineOptions, SegmentationOptions};
use crate::commands::{build_engine_profile, build_segmentation_profile};
use crate::ui::TermProgressTracker;

#[allow(clippy::too_many_arguments)]
pub fn run(
    input: PathBuf,
    preprocess: String,
    no_refine: bool,
    refine_mode: String,
    refine_instructions: Option<String>,
    output: Option<PathBuf>,
    copy: bool,
    history: bool,
    keep_intermediates: bool,
    engine: EngineOptions,
    segmentation: SegmentationOptions,
) -> Result<()> {
    let engine_profile = build_engine_profile(&engine)?;
    let segmentation_profile = build_segmentation_profile(&segmentation)?;
    let preprocess_config = PreprocessingConfig::from_preset(&preprocess)?;

    let refine = !no_refine;
    let mode: RefinementMode = refine_mode.parse()?;
    let instructions = refine_instructions.or_else(|| refine.then(|| mode.prompt().to_string()));

    let mut worker = EngineWorker::new(engine_profile.clone());
    if refine {
        worker = worker.with_refiner(Box::new(OllamaRefiner::default()));
    }

    let tracker = TermProgressTracker::new();
    let options = WorkflowOptions {
        refine,
        refine_instructions: instructions,
        keep_intermediates: Some(keep_intermediates),
        preprocess: Some(preprocess_config),
        ..Default::default()
    };
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

    let mut sinks: Vec<Box<dyn Sink>> = vec![match &output {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(StdoutSink::new(false)) as Box<dyn Sink>,
    }];

    #[cfg(feature = "clipboard")]
    if copy {
        sinks.push(Box::new(sotto_core::sinks::ClipboardSink));
    }
    #[cfg(not(feature = "clipboard"))]
    if copy {
        eprintln!("Warning: clipboard support not built in, ignoring --copy");
    }

    #[cfg(feature = "history")]
    if history {
        let storage = sotto_core::history::SqliteHistory::new(
            sotto_core::server::protocol::cache_dir().join("history.db"),
        );
        sinks.push(Box::new(sotto_core::sinks::HistorySink::new(
            Box::new(storage),
            Some(input.clone()),
        )));
    }
    #[cfg(not(feature = "history"))]
    if history {
        eprintln!("Warning: history support not built in, ignoring --history");
    }

    let mut sink = CompositeSink::new(sinks);
    for segment in &result.segments {
        sink.handle_segment(segment)?;
    }
    sink.complete(&result)?;
    Ok(())
}
