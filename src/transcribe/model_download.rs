use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::config::WhisperModelPreset;

/// Where auto-downloaded ggml models land, relative to the working directory.
const MODEL_DIR: &str = "models";

fn preset_source(preset: WhisperModelPreset) -> (&'static str, &'static str) {
    match preset {
        WhisperModelPreset::Tiny => (
            "ggml-tiny.bin",
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin",
        ),
        WhisperModelPreset::Base => (
            "ggml-base.bin",
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin",
        ),
        WhisperModelPreset::Small => (
            "ggml-small.bin",
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-small.bin",
        ),
        WhisperModelPreset::Medium => (
            "ggml-medium.bin",
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-medium.bin",
        ),
        WhisperModelPreset::Large => (
            "ggml-large-v3.bin",
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3.bin",
        ),
    }
}

/// Resolves the model file for `preset`, downloading it on first use.
/// An explicit path wins over the preset and is never downloaded to.
pub fn resolve_whisper_model_path(
    explicit_path: Option<PathBuf>,
    preset: WhisperModelPreset,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(path);
    }

    let (filename, url) = preset_source(preset);
    let model_path = Path::new(MODEL_DIR).join(filename);
    if model_path.exists() {
        return Ok(model_path);
    }

    fs::create_dir_all(MODEL_DIR).context("failed to create models/ directory")?;
    tracing::info!("downloading {filename} to {}", model_path.display());
    download_file(url, &model_path)
        .with_context(|| format!("failed to download model from {url}"))?;
    Ok(model_path)
}

fn download_file(url: &str, dest: &Path) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60 * 30))
        .user_agent("tubescribe/0.1")
        .build()
        .context("failed to build HTTP client")?;

    let mut resp = client
        .get(url)
        .send()
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url} returned error"))?;

    if let Some(len) = resp.content_length() {
        tracing::info!("model size: {:.0} MiB", len as f64 / (1024.0 * 1024.0));
    }

    // Stream into a sibling temp file and rename, so an interrupted download
    // never leaves a truncated model that a later run would try to load.
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create a temp file in {}", dir.display()))?;
    io::copy(&mut resp, tmp.as_file_mut()).context("failed downloading model file")?;
    tmp.persist(dest)
        .with_context(|| format!("failed to move the download to {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_has_a_ggml_source() {
        for preset in WhisperModelPreset::ALL {
            let (filename, url) = preset_source(preset);
            assert!(filename.starts_with("ggml-"));
            assert!(url.ends_with(filename));
        }
    }

    #[test]
    fn explicit_path_wins_over_preset() {
        let explicit = PathBuf::from("/models/custom.bin");
        let resolved =
            resolve_whisper_model_path(Some(explicit.clone()), WhisperModelPreset::Tiny).unwrap();
        assert_eq!(resolved, explicit);
    }
}
