use std::path::PathBuf;
use std::sync::Arc;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::AudioChunk;
use crate::config::WhisperModelPreset;
use crate::transcribe::model_download::resolve_whisper_model_path;
use crate::transcribe::{ModelCache, Transcriber, TranscriptionError};

/// Chunk transcription backed by a whisper.cpp context from the shared cache.
pub struct WhisperLocalTranscriber {
    ctx: Arc<WhisperContext>,
    language: Option<String>,
    n_threads: i32,
}

impl WhisperLocalTranscriber {
    pub fn new(
        cache: &ModelCache<WhisperContext>,
        model_path: Option<PathBuf>,
        preset: WhisperModelPreset,
        language: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        let ctx = cache.get_or_load(preset, || load_context(model_path, preset))?;

        let n_threads = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(4)
            .clamp(1, 8);

        Ok(Self {
            ctx,
            language,
            n_threads,
        })
    }
}

fn load_context(
    model_path: Option<PathBuf>,
    preset: WhisperModelPreset,
) -> Result<WhisperContext, TranscriptionError> {
    let model_path = resolve_whisper_model_path(model_path, preset)
        .map_err(|err| TranscriptionError::ModelLoad(format!("{err:#}")))?;
    tracing::info!("loading whisper model ({preset}): {}", model_path.display());

    let path = model_path
        .to_str()
        .ok_or_else(|| TranscriptionError::ModelLoad("model path is not valid UTF-8".into()))?;
    WhisperContext::new_with_params(path, WhisperContextParameters::default())
        .map_err(|err| TranscriptionError::ModelLoad(err.to_string()))
}

impl Transcriber for WhisperLocalTranscriber {
    fn transcribe(&mut self, chunk: &AudioChunk) -> Result<String, TranscriptionError> {
        if chunk.samples.is_empty() {
            return Ok(String::new());
        }

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 0 });
        params.set_n_threads(self.n_threads);
        params.set_translate(false);
        // `language=None` means auto-detect while still transcribing;
        // `detect_language` would detect and return without any text.
        params.set_language(self.language.as_deref());
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = self.ctx.create_state().map_err(|err| {
            TranscriptionError::Inference(format!("failed to create state: {err}"))
        })?;
        state
            .full(params, &chunk.samples)
            .map_err(|err| TranscriptionError::Inference(err.to_string()))?;

        let segments: Vec<String> = state
            .as_iter()
            .map(|seg| seg.to_string().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        Ok(segments.join(" "))
    }
}
