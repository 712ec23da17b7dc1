use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Default silence threshold in dBFS. Anything quieter counts as silence.
pub const DEFAULT_SILENCE_THRESHOLD_DB: f32 = -40.0;
/// Default minimum silence length (ms) for a cut point.
pub const DEFAULT_MIN_SILENCE_MS: u64 = 500;
/// Default padding of silence (ms) kept around each cut.
pub const DEFAULT_KEEP_SILENCE_MS: u64 = 300;
/// Default upper bound (ms) on a single chunk before it is subdivided.
pub const DEFAULT_MAX_CHUNK_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// On-device transcription via whisper.cpp.
    #[value(name = "local")]
    Local,
    /// Cloud transcription via an OpenAI-compatible `/v1/audio/transcriptions`.
    #[value(name = "cloud", alias = "openai")]
    Cloud,
}

impl Engine {
    pub fn label(self) -> &'static str {
        match self {
            Engine::Local => "local (whisper.cpp)",
            Engine::Cloud => "cloud API",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum WhisperModelPreset {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperModelPreset {
    pub const ALL: [WhisperModelPreset; 5] = [
        WhisperModelPreset::Tiny,
        WhisperModelPreset::Base,
        WhisperModelPreset::Small,
        WhisperModelPreset::Medium,
        WhisperModelPreset::Large,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WhisperModelPreset::Tiny => "tiny",
            WhisperModelPreset::Base => "base",
            WhisperModelPreset::Small => "small",
            WhisperModelPreset::Medium => "medium",
            WhisperModelPreset::Large => "large",
        }
    }
}

impl std::fmt::Display for WhisperModelPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Parser, Clone)]
#[command(name = "tubescribe", version, about = "Download a video's audio and transcribe it")]
pub struct Cli {
    /// Video URL. Pre-fills the form in GUI mode; required with `--no-ui`.
    #[arg(long)]
    pub url: Option<String>,

    /// Transcription engine to use.
    #[arg(long, value_enum, default_value_t = Engine::Local)]
    pub engine: Engine,

    /// Local whisper model size to download when `--whisper-model` is not given.
    #[arg(long, value_enum, default_value_t = WhisperModelPreset::Base)]
    pub whisper_model_preset: WhisperModelPreset,

    /// Local whisper model file path. If omitted, a model will be downloaded.
    #[arg(long)]
    pub whisper_model: Option<PathBuf>,

    /// Input language (e.g. `en`, `ja`) or `auto`.
    #[arg(long, alias = "language", default_value = "auto")]
    pub input_language: String,

    /// Silence threshold (dBFS) for splitting; quieter is silence.
    #[arg(long, default_value_t = DEFAULT_SILENCE_THRESHOLD_DB)]
    pub silence_threshold_db: f32,

    /// Minimum silence length (ms) that may become a cut point.
    #[arg(long, default_value_t = DEFAULT_MIN_SILENCE_MS)]
    pub min_silence_ms: u64,

    /// Silence padding (ms) kept at chunk edges.
    #[arg(long, default_value_t = DEFAULT_KEEP_SILENCE_MS)]
    pub keep_silence_ms: u64,

    /// Maximum chunk length (ms) before forced subdivision.
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNK_MS)]
    pub max_chunk_ms: u64,

    /// API key for the cloud engine (or set `OPENAI_API_KEY`).
    #[arg(long, env = "OPENAI_API_KEY")]
    pub cloud_api_key: Option<String>,

    /// Model name sent to the cloud endpoint.
    #[arg(long, default_value = "whisper-1")]
    pub cloud_model: String,

    /// OpenAI-compatible transcription endpoint.
    #[arg(long, default_value = "https://api.openai.com/v1/audio/transcriptions")]
    pub cloud_endpoint: String,

    /// `yt-dlp` executable to invoke.
    #[arg(long, default_value = "yt-dlp")]
    pub yt_dlp_bin: String,

    /// Run one job without the GUI and print the transcript to stdout.
    #[arg(long)]
    pub no_ui: bool,

    /// Transcript output path (`--no-ui` mode). Prints to stdout if omitted.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Language hint for the engines; `auto`/blank means detect.
    pub fn language_hint(&self) -> Option<String> {
        let lang = self.input_language.trim();
        if lang.is_empty() || lang.eq_ignore_ascii_case("auto") {
            None
        } else {
            Some(lang.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_hint_filters_auto() {
        let mut cli = <Cli as clap::Parser>::parse_from(["tubescribe"]);
        assert_eq!(cli.language_hint(), None);
        cli.input_language = "  ja ".into();
        assert_eq!(cli.language_hint(), Some("ja".into()));
        cli.input_language = "AUTO".into();
        assert_eq!(cli.language_hint(), None);
    }

    #[test]
    fn engine_values_parse() {
        let cli = <Cli as clap::Parser>::parse_from(["tubescribe", "--engine", "openai"]);
        assert_eq!(cli.engine, Engine::Cloud);
        let cli = <Cli as clap::Parser>::parse_from(["tubescribe", "--engine", "local"]);
        assert_eq!(cli.engine, Engine::Local);
    }
}
