pub mod app;
pub mod audio;
pub mod config;
pub mod download;
pub mod transcribe;
pub mod transcript;
pub mod ui;

pub use app::{run_headless, start_worker, Job, RunHandle, RunPhase, WorkerEvent};
pub use config::{Cli, Engine, WhisperModelPreset};
pub use ui::run_gui;
