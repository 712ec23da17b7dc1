mod cloud;
mod local_whisper;
mod model_download;

use std::collections::HashMap;
use std::sync::Arc;

pub use cloud::CloudTranscriber;
pub use local_whisper::WhisperLocalTranscriber;
pub use model_download::resolve_whisper_model_path;

use parking_lot::Mutex;
use thiserror::Error;

use crate::audio::AudioChunk;
use crate::config::WhisperModelPreset;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("failed to load whisper model: {0}")]
    ModelLoad(String),
    #[error("whisper inference failed: {0}")]
    Inference(String),
    #[error("speech service unreachable or over quota; try again later ({0})")]
    Service(String),
    #[error(
        "the service could not process this audio; the chunk may be \
         unintelligible — try different split settings ({0})"
    )]
    Unintelligible(String),
}

pub trait Transcriber: Send {
    /// Returns the text for one chunk. An empty string means the chunk held
    /// no recognizable speech; that is not an error.
    fn transcribe(&mut self, chunk: &AudioChunk) -> Result<String, TranscriptionError>;
}

/// Process-scoped cache of loaded inference models, keyed by size.
///
/// Loading a whisper context is expensive; each size is loaded at most once
/// and shared across runs. The application owns the cache and hands it to
/// workers as an `Arc`; `clear` releases every context explicitly.
pub struct ModelCache<T> {
    entries: Mutex<HashMap<WhisperModelPreset, Arc<T>>>,
}

impl<T> ModelCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached model for `preset`, calling `load` only on the
    /// first request for that size.
    pub fn get_or_load<E>(
        &self,
        preset: WhisperModelPreset,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let mut entries = self.entries.lock();
        if let Some(model) = entries.get(&preset) {
            return Ok(model.clone());
        }
        let model = Arc::new(load()?);
        entries.insert(preset, model.clone());
        Ok(model)
    }

    pub fn loaded_sizes(&self) -> Vec<WhisperModelPreset> {
        self.entries.lock().keys().copied().collect()
    }

    /// Drops every cached model.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn cache_loads_each_size_once() {
        let cache: ModelCache<u32> = ModelCache::new();
        let mut loads = 0;

        for _ in 0..3 {
            let model = cache
                .get_or_load(WhisperModelPreset::Base, || {
                    loads += 1;
                    Ok::<_, Infallible>(7)
                })
                .unwrap();
            assert_eq!(*model, 7);
        }
        assert_eq!(loads, 1);

        cache
            .get_or_load(WhisperModelPreset::Small, || {
                loads += 1;
                Ok::<_, Infallible>(8)
            })
            .unwrap();
        assert_eq!(loads, 2);
        assert_eq!(cache.loaded_sizes().len(), 2);
    }

    #[test]
    fn cache_does_not_store_failed_loads() {
        let cache: ModelCache<u32> = ModelCache::new();
        let err = cache
            .get_or_load(WhisperModelPreset::Tiny, || Err::<u32, _>("no model file"))
            .unwrap_err();
        assert_eq!(err, "no model file");
        assert!(cache.loaded_sizes().is_empty());

        let model = cache
            .get_or_load(WhisperModelPreset::Tiny, || Ok::<_, &str>(1))
            .unwrap();
        assert_eq!(*model, 1);
    }

    #[test]
    fn clear_releases_entries() {
        let cache: ModelCache<u32> = ModelCache::new();
        cache
            .get_or_load(WhisperModelPreset::Large, || Ok::<_, Infallible>(1))
            .unwrap();
        cache.clear();
        assert!(cache.loaded_sizes().is_empty());
    }
}
