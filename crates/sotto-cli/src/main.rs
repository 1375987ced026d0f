mod args;
mod commands;
mod error;
mod ui;

use clap::Parser;

fn main() {
    let cli = args::Cli::parse();
    sotto_core::set_verbose(cli.verbose);

    if let Err(err) = run(cli) {
        error::display_error(&err);
        std::process::exit(error::exit_code(&err));
    }
}

fn run(cli: args::Cli) -> sotto_core::Result<()> {
    match cli.command {
        args::Commands::Decode { input, output } => commands::decode::run(input, output),
        args::Commands::Vad {
            input,
            output,
            segmentation,
        } => commands::vad::run(input, output, segmentation),
        args::Commands::Condense {
            input,
            timestamps,
            output_dir,
            single,
            segmentation,
        } => commands::condense::run(input, timestamps, output_dir, single, segmentation),
        args::Commands::Record { duration, output } => commands::record::run(duration, output),
        args::Commands::Transcribe {
            input,
            output,
            timestamps,
            no_daemon,
            engine,
            segmentation,
        } => commands::transcribe::run(input, output, timestamps, no_daemon, engine, segmentation),
        args::Commands::TranscribeFull {
            input,
            preprocess,
            no_refine,
            refine_mode,
            refine_instructions,
            output,
            copy,
            history,
            keep_intermediates,
            engine,
            segmentation,
        } => commands::transcribe_full::run(
            input,
            preprocess,
            no_refine,
            refine_mode,
            refine_instructions,
            output,
            copy,
            history,
            keep_intermediates,
            engine,
            segmentation,
        ),
        args::Commands::Batch {
            files,
            output_dir,
            parallel,
            fail_fast,
            daemon_mode,
            combined,
            preprocess,
            refine,
            engine,
            segmentation,
        } => commands::batch::run(
            files,
            output_dir,
            parallel,
            fail_fast,
            daemon_mode,
            combined,
            preprocess,
            refine,
            engine,
            segmentation,
        ),
        args::Commands::Bench {
            input,
            runs,
            engine,
            segmentation,
        } => commands::bench::run(input, runs, engine, segmentation),
        args::Commands::Refine {
            input,
            mode,
            instructions,
            model,
            server_url,
        } => commands::refine::run(input, mode, instructions, model, server_url),
        args::Commands::Daemon { action } => commands::daemon::run(action),
    }
}
