use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use whisper_rs::WhisperContext;

use crate::app::{start_worker, Job, RunHandle, RunPhase, WorkerEvent};
use crate::config::{Cli, Engine, WhisperModelPreset};
use crate::download;
use crate::transcribe::ModelCache;
use crate::transcript::Transcript;

/// Opens the main window and blocks until it closes.
pub fn run_gui(cli: Cli, models: Arc<ModelCache<WhisperContext>>) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Tubescribe")
            .with_inner_size([780.0, 560.0]),
        ..Default::default()
    };

    let app = TranscriberApp::new(cli, models);
    eframe::run_native(
        "Tubescribe",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

pub struct TranscriberApp {
    cli: Cli,
    models: Arc<ModelCache<WhisperContext>>,

    url: String,
    engine: Engine,
    model_preset: WhisperModelPreset,
    save_path: String,

    log: String,
    phase: RunPhase,
    transcript: Option<Transcript>,
    run: Option<RunHandle>,
}

impl TranscriberApp {
    pub fn new(cli: Cli, models: Arc<ModelCache<WhisperContext>>) -> Self {
        let mut log = String::new();
        for tool in [cli.yt_dlp_bin.as_str(), "ffmpeg"] {
            match download::probe_tool(tool) {
                Some(version) => {
                    let _ = writeln!(log, "{tool}: {version}");
                }
                None => {
                    let _ = writeln!(
                        log,
                        "WARNING: {tool} not found on PATH; downloads will likely fail"
                    );
                }
            }
        }

        Self {
            url: cli.url.clone().unwrap_or_default(),
            engine: cli.engine,
            model_preset: cli.whisper_model_preset,
            save_path: "transcript.txt".into(),
            log,
            phase: RunPhase::Idle,
            transcript: None,
            run: None,
            cli,
            models,
        }
    }

    fn is_running(&self) -> bool {
        self.run.is_some()
    }

    fn can_save(&self) -> bool {
        self.phase == RunPhase::Completed && self.transcript.is_some()
    }

    fn push_log(&mut self, line: &str) {
        self.log.push_str(line);
        self.log.push('\n');
    }

    /// Starts a run for the current form state. Rejected while one is active.
    fn start_run(&mut self) {
        if self.is_running() {
            return;
        }

        self.log.clear();
        self.transcript = None;
        self.phase = RunPhase::Idle;
        self.push_log("starting transcription");

        let mut job = Job::from_cli(&self.cli, self.url.trim().to_string());
        job.engine = self.engine;
        job.model_preset = self.model_preset;
        self.run = Some(start_worker(job, self.models.clone()));
    }

    fn cancel_run(&mut self) {
        if let Some(run) = &self.run {
            run.cancel();
            self.push_log("cancelling after the current chunk...");
        }
    }

    /// Moves pending worker events into UI state. Never blocks.
    fn drain_events(&mut self) {
        let Some(run) = &self.run else {
            return;
        };
        let events: Vec<WorkerEvent> = run.events.try_iter().collect();

        let mut finished = false;
        for event in events {
            match event {
                WorkerEvent::Phase(phase) => {
                    self.phase = phase;
                    let line = format!("--- {} ---", phase.describe());
                    // phase lines repeat per chunk; only log real changes
                    if !self.log.ends_with(&format!("{line}\n")) {
                        self.push_log(&line);
                    }
                }
                WorkerEvent::Log(line) => self.push_log(&line),
                WorkerEvent::ChunkDone { index, total } => {
                    self.push_log(&format!("{}/{} transcribed", index + 1, total));
                }
                WorkerEvent::Finished(transcript) => {
                    self.phase = RunPhase::Completed;
                    // the log gives way to the finished transcript
                    self.log = transcript.text();
                    self.transcript = Some(transcript);
                    finished = true;
                }
                WorkerEvent::Failed(reason) => {
                    self.phase = RunPhase::Failed;
                    self.push_log(&format!("ERROR: {reason}"));
                    finished = true;
                }
            }
        }

        if finished {
            self.run = None;
        }
    }

    /// Writes the finished transcript. Rejected outside Completed, with no
    /// side effects.
    fn save_transcript(&mut self) {
        if !self.can_save() {
            self.push_log("nothing to save: no completed transcript");
            return;
        }
        let Some(transcript) = &self.transcript else {
            return;
        };
        let path = self.save_path.trim().to_string();
        if path.is_empty() {
            self.push_log("enter an output path first");
            return;
        }
        match transcript.save(Path::new(&path)) {
            Ok(()) => self.push_log(&format!("transcript saved to {path}")),
            Err(err) => self.push_log(&format!("failed to save {path}: {err}")),
        }
    }
}

impl eframe::App for TranscriberApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        if self.is_running() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Video transcriber");
            ui.add_space(6.0);

            let running = self.is_running();

            ui.horizontal(|ui| {
                ui.label("Video URL:");
                ui.add_enabled(
                    !running,
                    egui::TextEdit::singleline(&mut self.url).desired_width(f32::INFINITY),
                );
            });

            ui.horizontal(|ui| {
                ui.label("Engine:");
                egui::ComboBox::from_id_salt("engine")
                    .selected_text(self.engine.label())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut self.engine, Engine::Local, Engine::Local.label());
                        ui.selectable_value(&mut self.engine, Engine::Cloud, Engine::Cloud.label());
                    });

                if self.engine == Engine::Local {
                    ui.label("Model:");
                    egui::ComboBox::from_id_salt("model")
                        .selected_text(self.model_preset.label())
                        .show_ui(ui, |ui| {
                            for preset in WhisperModelPreset::ALL {
                                ui.selectable_value(
                                    &mut self.model_preset,
                                    preset,
                                    preset.label(),
                                );
                            }
                        });
                }
            });

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let can_start = !running && !self.url.trim().is_empty();
                if ui
                    .add_enabled(can_start, egui::Button::new("Start transcription"))
                    .clicked()
                {
                    self.start_run();
                }
                if running && ui.button("Cancel").clicked() {
                    self.cancel_run();
                }
                ui.label(self.phase.describe());
            });

            ui.add_space(8.0);
            ui.separator();
            ui.label("Log & transcript:");

            egui::ScrollArea::vertical()
                .stick_to_bottom(!self.can_save())
                .auto_shrink([false, false])
                .max_height((ui.available_height() - 40.0).max(120.0))
                .show(ui, |ui| {
                    let mut shown: &str = &self.log;
                    ui.add(
                        egui::TextEdit::multiline(&mut shown)
                            .desired_width(f32::INFINITY)
                            .desired_rows(16),
                    );
                });

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.label("Save to:");
                ui.add(egui::TextEdit::singleline(&mut self.save_path).desired_width(260.0));
                if ui
                    .add_enabled(self.can_save(), egui::Button::new("Save transcript"))
                    .clicked()
                {
                    self.save_transcript();
                }
            });
        });
    }
}
