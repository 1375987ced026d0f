use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;
use std::time::Duration;

/// Parse a duration string like "10s", "30s", "1m", "90"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str
            .parse()
            .map_err(|_| format!("invalid number: {}", num_str))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str
            .parse()
            .map_err(|_| format!("invalid number: {}", num_str))?;
        Ok(Duration::from_secs(mins * 60))
    } else {
        let secs: u64 = s.parse().map_err(|_| format!("invalid duration: {}", s))?;
        Ok(Duration::from_secs(secs))
    }
}

/// Engine selection options shared by transcription commands
#[derive(Args)]
pub struct EngineOptions {
    /// Engine kind (whisper_turbo, parakeet)
    #[arg(long, default_value = "parakeet")]
    pub engine: String,

    /// Model name for the engine (run with an invalid name to list models)
    #[arg(long)]
    pub model: Option<String>,

    /// Inference device (auto, cpu, cuda)
    #[arg(long, default_value = "auto")]
    pub device: String,

    /// Numeric precision (auto, fp32, fp16, bf16, int8, int8_fp16)
    #[arg(long = "compute-type", default_value = "auto")]
    pub compute_type: String,

    /// Directory holding model files
    #[arg(long = "model-dir", value_hint = ValueHint::DirPath)]
    pub model_dir: Option<PathBuf>,

    /// Named engine preset (balanced, high_quality, fast, cpu_compatible);
    /// overrides the options above
    #[arg(long = "engine-preset")]
    pub engine_preset: Option<String>,

    /// Language hint (ISO-639-1, e.g. "en")
    #[arg(short, long)]
    pub language: Option<String>,
}

/// Segmentation options shared by pipeline commands
#[derive(Args)]
pub struct SegmentationOptions {
    /// Named segmentation preset (balanced, sensitive, strict, podcast, lecture)
    #[arg(long = "seg-preset", default_value = "balanced")]
    pub seg_preset: String,

    /// Override the VAD speech threshold (0.0-1.0)
    #[arg(long = "vad-threshold")]
    pub vad_threshold: Option<f32>,

    /// Override the maximum chunk length in seconds
    #[arg(long = "max-chunk")]
    pub max_chunk_s: Option<f64>,
}

#[derive(Parser)]
#[command(name = "sotto")]
#[command(version)]
#[command(about = "File-first speech-to-text pipeline with a warm-model daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode any audio file to canonical WAV (mono, 16 kHz, s16)
    Decode {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Output WAV path (default: <stem>_decoded.wav next to input)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,
    },

    /// Detect speech spans and print/save the timestamps
    Vad {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Save timestamps to this JSON file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        #[command(flatten)]
        segmentation: SegmentationOptions,
    },

    /// Condense an audio file into speech-only chunks
    Condense {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Precomputed VAD timestamps (JSON); detected when omitted
        #[arg(long, value_hint = ValueHint::FilePath)]
        timestamps: Option<PathBuf>,

        /// Directory for chunk files (default: next to input)
        #[arg(short, long, value_hint = ValueHint::DirPath)]
        output_dir: Option<PathBuf>,

        /// Produce exactly one output file at this path (disables splitting)
        #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "output_dir")]
        single: Option<PathBuf>,

        #[command(flatten)]
        segmentation: SegmentationOptions,
    },

    /// Record a clip from the microphone to a WAV file
    Record {
        /// Recording duration (e.g. "10s", "1m")
        #[arg(short, long, default_value = "5s", value_parser = parse_duration)]
        duration: Duration,

        /// Output WAV path
        #[arg(short, long, default_value = "recording.wav", value_hint = ValueHint::FilePath)]
        output: PathBuf,
    },

    /// Transcribe a single audio file
    Transcribe {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Save the transcript to this file instead of printing it
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Print segments with timestamps
        #[arg(long)]
        timestamps: bool,

        /// Skip the warm daemon even when it is running
        #[arg(long)]
        no_daemon: bool,

        #[command(flatten)]
        engine: EngineOptions,

        #[command(flatten)]
        segmentation: SegmentationOptions,
    },

    /// Full pipeline: preprocess, transcribe, refine, fan out to sinks
    TranscribeFull {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Preprocessing preset (none, basic, clean, phone, podcast)
        #[arg(long, default_value = "none")]
        preprocess: String,

        /// Skip the LLM refinement pass
        #[arg(long)]
        no_refine: bool,

        /// Refinement mode (grammar_only, summary, bullet_points)
        #[arg(long = "refine-mode", default_value = "grammar_only")]
        refine_mode: String,

        /// Custom refinement instructions (overrides --refine-mode)
        #[arg(long = "refine-instructions")]
        refine_instructions: Option<String>,

        /// Save the transcript to this file
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Copy the transcript to the clipboard
        #[arg(long)]
        copy: bool,

        /// Append the transcript to the history store
        #[arg(long)]
        history: bool,

        /// Keep intermediate files (decoded WAV, timestamps, chunks)
        #[arg(long)]
        keep_intermediates: bool,

        #[command(flatten)]
        engine: EngineOptions,

        #[command(flatten)]
        segmentation: SegmentationOptions,
    },

    /// Transcribe many files with bounded parallelism
    Batch {
        /// Audio files to transcribe
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        files: Vec<PathBuf>,

        /// Directory for per-file transcripts
        #[arg(short, long, default_value = "transcripts", value_hint = ValueHint::DirPath)]
        output_dir: PathBuf,

        /// Number of parallel workers
        #[arg(short, long, default_value_t = 1)]
        parallel: usize,

        /// Stop dispatching new files after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Daemon usage (never, auto, always)
        #[arg(long = "daemon-mode", default_value = "auto")]
        daemon_mode: String,

        /// Also write a combined transcript to this file
        #[arg(long, value_hint = ValueHint::FilePath)]
        combined: Option<PathBuf>,

        /// Preprocessing preset applied to every file
        #[arg(long, default_value = "none")]
        preprocess: String,

        /// Run the refinement pass on every transcript
        #[arg(long)]
        refine: bool,

        #[command(flatten)]
        engine: EngineOptions,

        #[command(flatten)]
        segmentation: SegmentationOptions,
    },

    /// Measure transcription speed (real-time factor)
    Bench {
        #[arg(value_hint = ValueHint::FilePath)]
        input: PathBuf,

        /// Number of timed runs
        #[arg(long, default_value_t = 1)]
        runs: usize,

        #[command(flatten)]
        engine: EngineOptions,

        #[command(flatten)]
        segmentation: SegmentationOptions,
    },

    /// Refine transcript text with the local LLM
    Refine {
        /// Text file to refine; reads stdin when omitted
        #[arg(value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,

        /// Refinement mode (grammar_only, summary, bullet_points)
        #[arg(long, default_value = "grammar_only")]
        mode: String,

        /// Custom instructions (overrides --mode)
        #[arg(long)]
        instructions: Option<String>,

        /// Ollama model to refine with
        #[arg(long)]
        model: Option<String>,

        /// Ollama server URL
        #[arg(long = "server-url")]
        server_url: Option<String>,
    },

    /// Manage the warm-model daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Start the daemon in the background and wait until it is healthy
    Start {
        #[command(flatten)]
        engine: EngineOptions,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon status
    Status,

    /// Print the daemon log
    Logs {
        /// Number of trailing lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },

    /// Run the daemon in the foreground (spawned by `daemon start`)
    #[command(hide = true)]
    Run {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8765)]
        port: u16,

        #[command(flatten)]
        engine: EngineOptions,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parser_accepts_suffixes() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
    }

    #[test]
    fn cli_parses_transcribe() {
        let cli = Cli::try_parse_from(["sotto", "transcribe", "audio.mp3", "--engine", "whisper_turbo"]).unwrap();
        match cli.command {
            Commands::Transcribe { input, engine, .. } => {
                assert_eq!(input, PathBuf::from("audio.mp3"));
                assert_eq!(engine.engine, "whisper_turbo");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn cli_parses_daemon_run_with_port() {
        let cli = Cli::try_parse_from(["sotto", "daemon", "run", "--port", "9000"]).unwrap();
        match cli.command {
            Commands::Daemon {
                action: DaemonAction::Run { port, host, .. },
            } => {
                assert_eq!(port, 9000);
                assert_eq!(host, "127.0.0.1");
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn batch_requires_files() {
        assert!(Cli::try_parse_from(["sotto", "batch"]).is_err());
    }
}
