//! Warm-model daemon server.
//!
//! A long-lived process that keeps one heavy ASR model resident and serves
//! local clients over loopback HTTP (axum) and, on Unix, a newline-delimited
//! JSON socket. Connections are accepted concurrently, but all model-touching
//! work funnels through a single-consumer request queue drained by one
//! inference thread; `/health` and `/status` read shared atomics and are
//! never queued behind an inference.
//!
//! Lifecycle: starting (socket bound, PID written, model loading) → ready →
//! draining (shutdown requested, in-flight request finishes) → stopped
//! (socket unlinked, PID file removed).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::{Notify, mpsc, oneshot};

use crate::config::{EngineConfig, EngineKind, TranscriptionOptions};
use crate::domain::TranscriptSegment;
use crate::engine::build_engine;
use crate::error::{ErrorDetails, Result, SottoError};
use crate::refine::{OllamaRefiner, Refiner};

use super::protocol::{
    BatchItemResponse, BatchTranscribeRequest, BatchTranscribeResponse, DEFAULT_DAEMON_HOST,
    DEFAULT_DAEMON_PORT, HealthResponse, RefineRequest, RefineResponse, SegmentResponse,
    ShutdownResponse, SocketRequest, StatusResponse, TranscribeRequest, TranscribeResponse,
    default_socket_path, ensure_cache_dir, pid_file_path,
};

/// How the daemon is configured at launch.
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub socket_path: PathBuf,
    pub engine_kind: EngineKind,
    pub engine_config: EngineConfig,
    /// Attach the Ollama-backed refiner for `/refine`
    pub enable_refiner: bool,
}

impl DaemonConfig {
    pub fn new(engine_kind: EngineKind, engine_config: EngineConfig) -> Self {
        Self {
            host: DEFAULT_DAEMON_HOST.to_string(),
            port: DEFAULT_DAEMON_PORT,
            socket_path: default_socket_path(),
            engine_kind,
            engine_config,
            enable_refiner: true,
        }
    }
}

enum InferenceJob {
    Transcribe {
        paths: Vec<PathBuf>,
        language: String,
        reply: oneshot::Sender<Result<Vec<Vec<TranscriptSegment>>>>,
    },
    Refine {
        text: String,
        instructions: Option<String>,
        reply: oneshot::Sender<Result<String>>,
    },
}

struct AppState {
    model_name: String,
    device: String,
    model_loaded: AtomicBool,
    draining: AtomicBool,
    started_at: Instant,
    requests_handled: AtomicU64,
    jobs: mpsc::Sender<InferenceJob>,
    shutdown: Notify,
}

impl AppState {
    fn status_str(&self) -> &'static str {
        if self.draining.load(Ordering::SeqCst) {
            "draining"
        } else if self.model_loaded.load(Ordering::SeqCst) {
            "ready"
        } else {
            "starting"
        }
    }

    fn uptime(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Run the daemon until shutdown. Blocks the calling thread.
pub fn run_blocking(config: DaemonConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        SottoError::DaemonStart(ErrorDetails::new("Failed to create async runtime").with_cause(e))
    })?;
    runtime.block_on(run(config))
}

/// Run the daemon until shutdown.
pub async fn run(config: DaemonConfig) -> Result<()> {
    ensure_cache_dir()?;

    // Stale socket from a crashed predecessor
    #[cfg(unix)]
    let _ = std::fs::remove_file(&config.socket_path);

    let (job_tx, job_rx) = mpsc::channel::<InferenceJob>(64);
    let state = Arc::new(AppState {
        model_name: config.engine_config.model_name.clone(),
        device: config.engine_config.device.to_string(),
        model_loaded: AtomicBool::new(false),
        draining: AtomicBool::new(false),
        started_at: Instant::now(),
        requests_handled: AtomicU64::new(0),
        jobs: job_tx,
        shutdown: Notify::new(),
    });

    // Fatal model-load failure must take the whole process down non-zero.
    let (fatal_tx, mut fatal_rx) = oneshot::channel::<SottoError>();
    spawn_inference_worker(
        config.engine_kind,
        config.engine_config.clone(),
        config.enable_refiner,
        job_rx,
        Arc::clone(&state),
        fatal_tx,
    );

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/transcribe", post(handle_transcribe))
        .route("/batch_transcribe", post(handle_batch_transcribe))
        .route("/refine", post(handle_refine))
        .route("/shutdown", post(handle_shutdown))
        .with_state(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        SottoError::DaemonStart(
            ErrorDetails::new(format!("Failed to bind {}", addr))
                .with_cause(e)
                .with_suggestion("Another daemon may already be running"),
        )
    })?;

    // Socket is bound: we are observable now. Write the PID file.
    std::fs::write(pid_file_path(), format!("{}\n", std::process::id()))?;
    crate::info!("Daemon listening on {} (PID {})", addr, std::process::id());

    #[cfg(unix)]
    let socket_task = spawn_socket_listener(&config.socket_path, Arc::clone(&state));

    let shutdown_state = Arc::clone(&state);
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_state.shutdown.notified() => {},
                _ = shutdown_signal() => {},
            }
            shutdown_state.draining.store(true, Ordering::SeqCst);
        })
        .await;

    // Teardown: only the daemon unlinks the socket it created.
    #[cfg(unix)]
    {
        socket_task.abort();
        let _ = std::fs::remove_file(&config.socket_path);
    }
    let _ = std::fs::remove_file(pid_file_path());
    crate::info!("Daemon stopped");

    if let Ok(fatal) = fatal_rx.try_recv() {
        return Err(fatal);
    }
    serve_result.map_err(|e| {
        SottoError::Daemon(ErrorDetails::new("Daemon server failed").with_cause(e))
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// The single consumer of the request queue. Owns the engine and the
/// refiner; processes jobs strictly serially.
fn spawn_inference_worker(
    kind: EngineKind,
    engine_config: EngineConfig,
    enable_refiner: bool,
    mut jobs: mpsc::Receiver<InferenceJob>,
    state: Arc<AppState>,
    fatal: oneshot::Sender<SottoError>,
) {
    std::thread::spawn(move || {
        let mut engine = match build_engine(kind, engine_config) {
            Ok(engine) => engine,
            Err(err) => {
                crate::error!("Engine construction failed: {}", err);
                state.shutdown.notify_one();
                let _ = fatal.send(err);
                return;
            }
        };

        let load_start = Instant::now();
        if let Err(err) = engine.preload() {
            crate::error!("Model load failed: {}", err);
            state.shutdown.notify_one();
            let _ = fatal.send(err);
            return;
        }
        state.model_loaded.store(true, Ordering::SeqCst);
        crate::info!("Model loaded in {:.2}s", load_start.elapsed().as_secs_f64());

        let refiner: Option<Box<dyn Refiner>> = enable_refiner
            .then(|| Box::new(OllamaRefiner::default()) as Box<dyn Refiner>);

        while let Some(job) = jobs.blocking_recv() {
            match job {
                InferenceJob::Transcribe { paths, language, reply } => {
                    let options = TranscriptionOptions {
                        language: Some(language),
                        ..TranscriptionOptions::default()
                    };
                    let result = engine.transcribe_files_batch(&paths, &options);
                    if result.is_ok() {
                        state.requests_handled.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = reply.send(result);
                }
                InferenceJob::Refine { text, instructions, reply } => {
                    let result = match &refiner {
                        Some(refiner) => refiner.refine(&text, instructions.as_deref()),
                        None => Ok(text),
                    };
                    if result.is_ok() {
                        state.requests_handled.fetch_add(1, Ordering::SeqCst);
                    }
                    let _ = reply.send(result);
                }
            }
        }
    });
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.status_str().to_string(),
        model_loaded: state.model_loaded.load(Ordering::SeqCst),
        model_name: state.model_name.clone(),
        uptime_seconds: state.uptime(),
        requests_handled: state.requests_handled.load(Ordering::SeqCst),
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.status_str().to_string(),
        model_loaded: state.model_loaded.load(Ordering::SeqCst),
        model_name: state.model_name.clone(),
        device: state.device.clone(),
        uptime_seconds: state.uptime(),
        requests_handled: state.requests_handled.load(Ordering::SeqCst),
    })
}

fn validate_paths(paths: &[String]) -> std::result::Result<Vec<PathBuf>, String> {
    if paths.is_empty() {
        return Err("audio_paths must not be empty".to_string());
    }
    let mut resolved = Vec::with_capacity(paths.len());
    for raw in paths {
        let path = PathBuf::from(raw);
        if !path.exists() {
            return Err(format!("audio path does not exist: {}", raw));
        }
        resolved.push(path);
    }
    Ok(resolved)
}

/// Run all files as one engine invocation and flatten the per-file groups:
/// the daemon handles grouping internally and clients treat the batch as a
/// single logical result.
async fn handle_transcribe(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TranscribeRequest>,
) -> (StatusCode, Json<TranscribeResponse>) {
    if state.draining.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(TranscribeResponse::failure("daemon is draining")),
        );
    }
    let paths = match validate_paths(&request.audio_paths) {
        Ok(paths) => paths,
        Err(msg) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(TranscribeResponse::failure(msg)),
            );
        }
    };

    let started = Instant::now();
    let (reply_tx, reply_rx) = oneshot::channel();
    let job = InferenceJob::Transcribe {
        paths,
        language: request.language,
        reply: reply_tx,
    };
    if state.jobs.send(job).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(TranscribeResponse::failure("inference worker is gone")),
        );
    }

    match reply_rx.await {
        Ok(Ok(groups)) => {
            let segments: Vec<SegmentResponse> = groups
                .iter()
                .flatten()
                .map(SegmentResponse::from_segment)
                .collect();
            (
                StatusCode::OK,
                Json(TranscribeResponse {
                    success: true,
                    segments,
                    inference_time_s: started.elapsed().as_secs_f64(),
                    error: None,
                }),
            )
        }
        Ok(Err(err)) => (StatusCode::OK, Json(TranscribeResponse::failure(err.to_string()))),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TranscribeResponse::failure("inference worker dropped the request")),
        ),
    }
}

async fn handle_batch_transcribe(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchTranscribeRequest>,
) -> (StatusCode, Json<BatchTranscribeResponse>) {
    let failure = |error: String| BatchTranscribeResponse {
        success: false,
        results: Vec::new(),
        error: Some(error),
    };

    if state.draining.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(failure("daemon is draining".into())),
        );
    }
    let paths = match validate_paths(&request.audio_paths) {
        Ok(paths) => paths,
        Err(msg) => return (StatusCode::UNPROCESSABLE_ENTITY, Json(failure(msg))),
    };

    let started = Instant::now();
    let (reply_tx, reply_rx) = oneshot::channel();
    let job = InferenceJob::Transcribe {
        paths,
        language: request.language,
        reply: reply_tx,
    };
    if state.jobs.send(job).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(failure("inference worker is gone".into())),
        );
    }

    match reply_rx.await {
        Ok(Ok(groups)) => {
            let per_file = started.elapsed().as_secs_f64() / groups.len().max(1) as f64;
            let results = groups
                .iter()
                .map(|group| BatchItemResponse {
                    segments: group.iter().map(SegmentResponse::from_segment).collect(),
                    inference_time_s: per_file,
                })
                .collect();
            (
                StatusCode::OK,
                Json(BatchTranscribeResponse {
                    success: true,
                    results,
                    error: None,
                }),
            )
        }
        Ok(Err(err)) => (StatusCode::OK, Json(failure(err.to_string()))),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(failure("inference worker dropped the request".into())),
        ),
    }
}

async fn handle_refine(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefineRequest>,
) -> (StatusCode, Json<RefineResponse>) {
    let failure = |error: String| RefineResponse {
        success: false,
        refined_text: String::new(),
        inference_time_s: 0.0,
        error: Some(error),
    };

    if request.text.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(failure("text must not be empty".into())),
        );
    }
    if state.draining.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(failure("daemon is draining".into())),
        );
    }

    let started = Instant::now();
    let (reply_tx, reply_rx) = oneshot::channel();
    let job = InferenceJob::Refine {
        text: request.text,
        instructions: request.instructions,
        reply: reply_tx,
    };
    if state.jobs.send(job).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(failure("inference worker is gone".into())),
        );
    }

    match reply_rx.await {
        Ok(Ok(refined_text)) => (
            StatusCode::OK,
            Json(RefineResponse {
                success: true,
                refined_text,
                inference_time_s: started.elapsed().as_secs_f64(),
                error: None,
            }),
        ),
        Ok(Err(err)) => (StatusCode::OK, Json(failure(err.to_string()))),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(failure("inference worker dropped the request".into())),
        ),
    }
}

async fn handle_shutdown(State(state): State<Arc<AppState>>) -> Json<ShutdownResponse> {
    crate::info!("Shutdown requested");
    state.draining.store(true, Ordering::SeqCst);
    state.shutdown.notify_one();
    Json(ShutdownResponse {
        success: true,
        message: "Shutting down".to_string(),
    })
}

/// NDJSON protocol over the Unix socket: one request per line, one
/// response per line, mirroring the HTTP bodies.
#[cfg(unix)]
fn spawn_socket_listener(socket_path: &std::path::Path, state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let socket_path = socket_path.to_path_buf();
    tokio::spawn(async move {
        let listener = match tokio::net::UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(e) => {
                crate::warn!("Unix socket bind failed on {}: {}", socket_path.display(), e);
                return;
            }
        };
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600));
        }

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => continue,
            };
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                if let Err(e) = handle_socket_client(stream, state).await {
                    crate::verbose!("Socket client error: {}", e);
                }
            });
        }
    })
}

#[cfg(unix)]
async fn handle_socket_client(
    stream: tokio::net::UnixStream,
    state: Arc<AppState>,
) -> std::io::Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let Some(line) = lines.next_line().await? else {
        return Ok(());
    };

    let response_json = match serde_json::from_str::<SocketRequest>(&line) {
        Ok(SocketRequest::Status) => serde_json::to_string(&StatusResponse {
            status: state.status_str().to_string(),
            model_loaded: state.model_loaded.load(Ordering::SeqCst),
            model_name: state.model_name.clone(),
            device: state.device.clone(),
            uptime_seconds: state.uptime(),
            requests_handled: state.requests_handled.load(Ordering::SeqCst),
        })
        .unwrap_or_default(),
        Ok(SocketRequest::Shutdown) => {
            state.draining.store(true, Ordering::SeqCst);
            state.shutdown.notify_one();
            serde_json::to_string(&ShutdownResponse {
                success: true,
                message: "Shutting down".to_string(),
            })
            .unwrap_or_default()
        }
        Ok(SocketRequest::Transcribe(request)) => {
            let response = match validate_paths(&request.audio_paths) {
                Err(msg) => TranscribeResponse::failure(msg),
                Ok(paths) => {
                    let started = Instant::now();
                    let (reply_tx, reply_rx) = oneshot::channel();
                    let job = InferenceJob::Transcribe {
                        paths,
                        language: request.language,
                        reply: reply_tx,
                    };
                    if state.jobs.send(job).await.is_err() {
                        TranscribeResponse::failure("inference worker is gone")
                    } else {
                        match reply_rx.await {
                            Ok(Ok(groups)) => TranscribeResponse {
                                success: true,
                                segments: groups
                                    .iter()
                                    .flatten()
                                    .map(SegmentResponse::from_segment)
                                    .collect(),
                                inference_time_s: started.elapsed().as_secs_f64(),
                                error: None,
                            },
                            Ok(Err(err)) => TranscribeResponse::failure(err.to_string()),
                            Err(_) => TranscribeResponse::failure("inference worker dropped the request"),
                        }
                    }
                }
            };
            serde_json::to_string(&response).unwrap_or_default()
        }
        Err(e) => serde_json::to_string(&TranscribeResponse::failure(format!(
            "Invalid request: {}",
            e
        )))
        .unwrap_or_default(),
    };

    write_half.write_all(response_json.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_list_is_rejected() {
        let err = validate_paths(&[]).unwrap_err();
        assert!(err.contains("must not be empty"));
    }

    #[test]
    fn nonexistent_path_is_rejected() {
        let err = validate_paths(&["/definitely/not/here.wav".to_string()]).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn existing_paths_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.wav");
        std::fs::write(&file, b"x").unwrap();
        let resolved = validate_paths(&[file.display().to_string()]).unwrap();
        assert_eq!(resolved, vec![file]);
    }

    #[test]
    fn status_string_follows_lifecycle() {
        let (job_tx, _job_rx) = mpsc::channel(1);
        let state = AppState {
            model_name: "m".into(),
            device: "cpu".into(),
            model_loaded: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            started_at: Instant::now(),
            requests_handled: AtomicU64::new(0),
            jobs: job_tx,
            shutdown: Notify::new(),
        };
        assert_eq!(state.status_str(), "starting");
        state.model_loaded.store(true, Ordering::SeqCst);
        assert_eq!(state.status_str(), "ready");
        state.draining.store(true, Ordering::SeqCst);
        assert_eq!(state.status_str(), "draining");
    }
}
