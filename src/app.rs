use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use whisper_rs::WhisperContext;

use crate::audio::{self, AudioChunk, SegmentationError, SegmenterConfig};
use crate::config::{Cli, Engine, WhisperModelPreset};
use crate::download::{self, DownloadError};
use crate::transcribe::{
    CloudTranscriber, ModelCache, Transcriber, TranscriptionError, WhisperLocalTranscriber,
};
use crate::transcript::{Transcript, TranscriptFragment};

/// Everything a single run needs, frozen at start.
#[derive(Debug, Clone)]
pub struct Job {
    pub url: String,
    pub engine: Engine,
    pub model_preset: WhisperModelPreset,
    pub model_path: Option<PathBuf>,
    pub language: Option<String>,
    pub segmenter: SegmenterConfig,
    pub cloud_api_key: Option<String>,
    pub cloud_model: String,
    pub cloud_endpoint: String,
    pub yt_dlp_bin: String,
}

impl Job {
    pub fn from_cli(cli: &Cli, url: String) -> Self {
        Self {
            url,
            engine: cli.engine,
            model_preset: cli.whisper_model_preset,
            model_path: cli.whisper_model.clone(),
            language: cli.language_hint(),
            segmenter: SegmenterConfig {
                silence_threshold_db: cli.silence_threshold_db,
                min_silence_ms: cli.min_silence_ms,
                keep_silence_ms: cli.keep_silence_ms,
                max_chunk_ms: cli.max_chunk_ms,
            },
            cloud_api_key: cli.cloud_api_key.clone(),
            cloud_model: cli.cloud_model.clone(),
            cloud_endpoint: cli.cloud_endpoint.clone(),
            yt_dlp_bin: cli.yt_dlp_bin.clone(),
        }
    }
}

/// Run state; transitions are strictly forward, there is no resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Downloading,
    Segmenting,
    Transcribing { done: usize, total: usize },
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }

    /// Position in the forward-only ordering.
    pub fn rank(self) -> u8 {
        match self {
            RunPhase::Idle => 0,
            RunPhase::Downloading => 1,
            RunPhase::Segmenting => 2,
            RunPhase::Transcribing { .. } => 3,
            RunPhase::Completed | RunPhase::Failed => 4,
        }
    }

    pub fn describe(self) -> String {
        match self {
            RunPhase::Idle => "idle".into(),
            RunPhase::Downloading => "downloading audio".into(),
            RunPhase::Segmenting => "splitting audio on silence".into(),
            RunPhase::Transcribing { done, total } => {
                format!("transcribing ({done}/{total} chunks done)")
            }
            RunPhase::Completed => "completed".into(),
            RunPhase::Failed => "failed".into(),
        }
    }
}

/// One-directional worker -> UI event stream.
#[derive(Debug)]
pub enum WorkerEvent {
    Phase(RunPhase),
    Log(String),
    ChunkDone { index: usize, total: usize },
    Finished(Transcript),
    Failed(String),
}

/// Single boundary where every adapter failure becomes one status line.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("audio splitting failed: {0}")]
    Segmentation(#[from] SegmentationError),
    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),
    #[error("audio splitting produced no usable chunks")]
    NoChunks,
    #[error("run cancelled")]
    Cancelled,
}

fn send(events: &Sender<WorkerEvent>, event: WorkerEvent) {
    // The receiver going away just means nobody is watching anymore.
    let _ = events.send(event);
}

fn cancelled(cancel: &AtomicBool) -> bool {
    cancel.load(Ordering::Relaxed)
}

/// Drives one job to completion: download, segment, transcribe, join.
///
/// The downloaded audio lives in a run-scoped temp directory that is removed
/// on every exit path. Cancellation is honored between phases and at chunk
/// boundaries.
pub fn run_job(
    job: &Job,
    models: &ModelCache<WhisperContext>,
    events: &Sender<WorkerEvent>,
    cancel: &AtomicBool,
) -> Result<Transcript, RunError> {
    if cancelled(cancel) {
        return Err(RunError::Cancelled);
    }

    send(events, WorkerEvent::Phase(RunPhase::Downloading));
    send(events, WorkerEvent::Log(format!("downloading audio for {}", job.url)));

    let temp_dir = tempfile::tempdir().map_err(DownloadError::Io)?;
    let wav_path = download::fetch_audio(&job.yt_dlp_bin, &job.url, temp_dir.path(), |line| {
        send(events, WorkerEvent::Log(line.to_string()));
    })?;
    send(
        events,
        WorkerEvent::Log(format!("download finished: {}", wav_path.display())),
    );

    if cancelled(cancel) {
        return Err(RunError::Cancelled);
    }

    send(events, WorkerEvent::Phase(RunPhase::Segmenting));
    let samples = audio::load_wav_mono_16k(&wav_path)?;
    send(
        events,
        WorkerEvent::Log(format!(
            "audio loaded ({:.1}s), splitting on silence",
            samples.len() as f32 / audio::TARGET_SAMPLE_RATE as f32
        )),
    );
    let chunks = audio::split_on_silence(&samples, &job.segmenter);
    drop(samples);
    if chunks.is_empty() {
        return Err(RunError::NoChunks);
    }
    send(
        events,
        WorkerEvent::Log(format!("audio split into {} chunks", chunks.len())),
    );

    if cancelled(cancel) {
        return Err(RunError::Cancelled);
    }

    send(
        events,
        WorkerEvent::Log(format!("starting {} engine", job.engine.label())),
    );
    let mut transcriber: Box<dyn Transcriber> = match job.engine {
        Engine::Local => Box::new(WhisperLocalTranscriber::new(
            models,
            job.model_path.clone(),
            job.model_preset,
            job.language.clone(),
        )?),
        Engine::Cloud => Box::new(CloudTranscriber::new(
            job.cloud_api_key.clone(),
            job.cloud_model.clone(),
            job.cloud_endpoint.clone(),
            job.language.clone(),
        )?),
    };

    transcribe_chunks(&chunks, transcriber.as_mut(), events, cancel)
}

/// Transcribes every chunk in order, fail-fast on the first error.
///
/// Emits a phase update before each chunk and a `ChunkDone` after it. On any
/// failure the remaining chunks are not attempted.
pub fn transcribe_chunks(
    chunks: &[AudioChunk],
    transcriber: &mut dyn Transcriber,
    events: &Sender<WorkerEvent>,
    cancel: &AtomicBool,
) -> Result<Transcript, RunError> {
    let total = chunks.len();
    let mut transcript = Transcript::new();

    for chunk in chunks {
        if cancelled(cancel) {
            return Err(RunError::Cancelled);
        }

        send(
            events,
            WorkerEvent::Phase(RunPhase::Transcribing {
                done: chunk.index,
                total,
            }),
        );

        let raw = transcriber.transcribe(chunk)?;
        let text = raw.trim();
        send(
            events,
            WorkerEvent::Log(format!(
                "chunk {}/{} ({:.1}s): {}",
                chunk.index + 1,
                total,
                chunk.duration_secs(),
                if text.is_empty() { "--silence--" } else { text }
            )),
        );

        let fragment = if text.is_empty() {
            TranscriptFragment::new(chunk.index, "")
        } else {
            TranscriptFragment::new(chunk.index, format!("{text}\n"))
        };
        transcript.push(fragment);
        send(
            events,
            WorkerEvent::ChunkDone {
                index: chunk.index,
                total,
            },
        );
    }

    Ok(transcript)
}

/// A live run: event stream plus the cancellation flag.
pub struct RunHandle {
    pub events: Receiver<WorkerEvent>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Spawns the worker thread for one job. The worker owns the job, reports
/// through the returned channel and never touches UI state.
pub fn start_worker(job: Job, models: Arc<ModelCache<WhisperContext>>) -> RunHandle {
    let (tx, rx) = crossbeam_channel::unbounded::<WorkerEvent>();
    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = cancel.clone();

    let thread = std::thread::spawn(move || {
        match run_job(&job, &models, &tx, &worker_cancel) {
            Ok(transcript) => send(&tx, WorkerEvent::Finished(transcript)),
            Err(err) => {
                tracing::warn!("run failed: {err}");
                send(&tx, WorkerEvent::Failed(err.to_string()));
            }
        }
    });

    RunHandle {
        events: rx,
        cancel,
        thread: Some(thread),
    }
}

/// Runs one job end to end without the GUI; Ctrl-C cancels cooperatively.
pub fn run_headless(cli: Cli) -> anyhow::Result<()> {
    let url = cli
        .url
        .clone()
        .context("--url is required together with --no-ui")?;

    for tool in [cli.yt_dlp_bin.as_str(), "ffmpeg"] {
        match download::probe_tool(tool) {
            Some(version) => tracing::info!("{tool}: {version}"),
            None => tracing::warn!("{tool} not found on PATH; the run will likely fail"),
        }
    }

    let models = Arc::new(ModelCache::new());
    let job = Job::from_cli(&cli, url);
    let handle = start_worker(job, models.clone());

    {
        let cancel = handle.cancel_flag();
        ctrlc::set_handler(move || {
            cancel.store(true, Ordering::Relaxed);
        })
        .context("failed to set Ctrl-C handler")?;
    }

    let mut outcome: anyhow::Result<()> = Ok(());
    for event in handle.events.iter() {
        match event {
            WorkerEvent::Phase(phase) => tracing::info!("{}", phase.describe()),
            WorkerEvent::Log(line) => tracing::info!("{line}"),
            WorkerEvent::ChunkDone { index, total } => {
                tracing::info!("{}/{} transcribed", index + 1, total);
            }
            WorkerEvent::Finished(transcript) => {
                match cli.output.as_ref() {
                    Some(path) => match transcript.save(path) {
                        Ok(()) => tracing::info!("transcript written to {}", path.display()),
                        Err(err) => {
                            outcome = Err(anyhow::anyhow!(err)
                                .context(format!("failed to write {}", path.display())));
                        }
                    },
                    None => println!("{}", transcript.text()),
                }
                break;
            }
            WorkerEvent::Failed(reason) => {
                outcome = Err(anyhow::anyhow!(reason));
                break;
            }
        }
    }

    handle.join();
    models.clear();
    outcome
}
