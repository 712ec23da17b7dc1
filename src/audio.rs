use std::path::{Path, PathBuf};

use thiserror::Error;

/// Sample rate every chunk is delivered at; whisper.cpp expects 16 kHz mono.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
/// RMS window used for silence detection.
const FRAME_MS: u64 = 20;
/// Chunks shorter than this are noise artifacts and dropped.
const MIN_CHUNK_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error(
        "could not decode {path}: {reason}. This usually means the ffmpeg \
         toolchain is missing from PATH or the download produced a corrupt file"
    )]
    Decode { path: PathBuf, reason: String },
    #[error("audio file {0} contains no samples")]
    Empty(PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// dBFS threshold; frames with RMS below this count as silence.
    pub silence_threshold_db: f32,
    /// Minimum silence run (ms) that becomes a cut point.
    pub min_silence_ms: u64,
    /// Silence padding (ms) kept on both sides of every cut.
    pub keep_silence_ms: u64,
    /// Upper bound (ms) on a chunk; longer ones are subdivided evenly.
    pub max_chunk_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: crate::config::DEFAULT_SILENCE_THRESHOLD_DB,
            min_silence_ms: crate::config::DEFAULT_MIN_SILENCE_MS,
            keep_silence_ms: crate::config::DEFAULT_KEEP_SILENCE_MS,
            max_chunk_ms: crate::config::DEFAULT_MAX_CHUNK_MS,
        }
    }
}

/// One bounded slice of the source audio, delimited by detected silence.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub index: usize,
    pub samples: Vec<f32>,
    pub start_secs: f32,
    pub end_secs: f32,
}

impl AudioChunk {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / TARGET_SAMPLE_RATE as f32
    }
}

/// Decodes a WAV file to 16 kHz mono f32 samples in [-1, 1].
///
/// The downloader asks yt-dlp for 16 kHz mono already, but files that arrive
/// with other layouts are downmixed and resampled rather than rejected.
pub fn load_wav_mono_16k(path: &Path) -> Result<Vec<f32>, SegmentationError> {
    let mut reader = hound::WavReader::open(path).map_err(|err| SegmentationError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|err| SegmentationError::Decode {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|err| SegmentationError::Decode {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })?
        }
    };

    if interleaved.is_empty() {
        return Err(SegmentationError::Empty(path.to_path_buf()));
    }

    let mono = downmix(&interleaved, channels);
    Ok(resample(&mono, spec.sample_rate, TARGET_SAMPLE_RATE))
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn resample(samples: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len =
        ((samples.len() as u64 * to_hz as u64) / from_hz as u64).max(1) as usize;
    let step = samples.len() as f64 / out_len as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(samples.len() - 1);
            let frac = (pos - lo as f64) as f32;
            samples[lo] * (1.0 - frac) + samples[hi] * frac
        })
        .collect()
}

/// dBFS -> linear amplitude.
fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

fn ms_to_samples(ms: u64) -> usize {
    (ms as usize * TARGET_SAMPLE_RATE as usize) / 1000
}

/// Finds maximal silent runs of at least `min_silence_samples`, as
/// `(start, end)` sample offsets.
fn silence_runs(samples: &[f32], threshold: f32, min_silence_samples: usize) -> Vec<(usize, usize)> {
    let frame_size = ms_to_samples(FRAME_MS).max(1);
    let mut runs = Vec::new();
    let mut run_start: Option<usize> = None;

    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + frame_size).min(samples.len());
        let silent = rms(&samples[pos..end]) < threshold;

        match (silent, run_start) {
            (true, None) => run_start = Some(pos),
            (false, Some(start)) => {
                if pos - start >= min_silence_samples {
                    runs.push((start, pos));
                }
                run_start = None;
            }
            _ => {}
        }
        pos = end;
    }

    if let Some(start) = run_start {
        if samples.len() - start >= min_silence_samples {
            runs.push((start, samples.len()));
        }
    }

    runs
}

/// Splits audio into ordered chunks on detected silence.
///
/// Non-silent stretches become chunks, each padded with up to
/// `keep_silence_ms` of the surrounding silence; padded stretches that touch
/// are merged. Chunks longer than `max_chunk_ms` are subdivided into equal
/// parts; chunks shorter than 100 ms are dropped. With no qualifying silence
/// the whole signal is one chunk, still subject to the length bound.
/// Deterministic for identical inputs.
pub fn split_on_silence(samples: &[f32], cfg: &SegmenterConfig) -> Vec<AudioChunk> {
    if samples.is_empty() {
        return Vec::new();
    }

    let threshold = db_to_amplitude(cfg.silence_threshold_db);
    let min_silence_samples = ms_to_samples(cfg.min_silence_ms).max(1);
    let keep_samples = ms_to_samples(cfg.keep_silence_ms);
    let runs = silence_runs(samples, threshold, min_silence_samples);

    // Non-silent stretches are the complement of the silence runs.
    let mut content: Vec<(usize, usize)> = Vec::new();
    let mut cursor = 0usize;
    for &(run_start, run_end) in &runs {
        if run_start > cursor {
            content.push((cursor, run_start));
        }
        cursor = run_end;
    }
    if cursor < samples.len() {
        content.push((cursor, samples.len()));
    }
    if content.is_empty() {
        // all silence (or none detected): hand the whole signal over as-is
        content.push((0, samples.len()));
    }

    // Pad with kept silence and merge stretches the padding made touch.
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for (start, end) in content {
        let padded = (
            start.saturating_sub(keep_samples),
            (end + keep_samples).min(samples.len()),
        );
        match spans.last_mut() {
            Some(last) if padded.0 <= last.1 => last.1 = padded.1,
            _ => spans.push(padded),
        }
    }

    let max_chunk_samples = ms_to_samples(cfg.max_chunk_ms).max(1);
    let min_chunk_samples = ms_to_samples(MIN_CHUNK_MS);

    let mut chunks = Vec::new();
    for (start, end) in spans {
        for (sub_start, sub_end) in subdivide(start, end, max_chunk_samples) {
            if sub_end - sub_start < min_chunk_samples {
                continue;
            }
            chunks.push(AudioChunk {
                index: chunks.len(),
                samples: samples[sub_start..sub_end].to_vec(),
                start_secs: sub_start as f32 / TARGET_SAMPLE_RATE as f32,
                end_secs: sub_end as f32 / TARGET_SAMPLE_RATE as f32,
            });
        }
    }

    chunks
}

/// Splits `[start, end)` into equal parts no longer than `max_len`.
fn subdivide(start: usize, end: usize, max_len: usize) -> Vec<(usize, usize)> {
    let len = end - start;
    if len <= max_len {
        return vec![(start, end)];
    }
    let parts = len.div_ceil(max_len);
    let part_len = len as f64 / parts as f64;
    (0..parts)
        .map(|i| {
            let sub_start = start + (i as f64 * part_len).round() as usize;
            let sub_end = if i + 1 == parts {
                end
            } else {
                start + ((i + 1) as f64 * part_len).round() as usize
            };
            (sub_start, sub_end)
        })
        .filter(|(s, e)| e > s)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(ms: u64, amplitude: f32) -> Vec<f32> {
        let n = ms_to_samples(ms);
        (0..n)
            .map(|i| amplitude * (i as f32 * 0.3).sin())
            .collect()
    }

    fn silence(ms: u64) -> Vec<f32> {
        vec![0.0; ms_to_samples(ms)]
    }

    fn speech_with_gaps() -> Vec<f32> {
        let mut samples = Vec::new();
        samples.extend(tone(1200, 0.5));
        samples.extend(silence(800));
        samples.extend(tone(900, 0.5));
        samples.extend(silence(700));
        samples.extend(tone(1500, 0.5));
        samples
    }

    #[test]
    fn db_conversion_matches_known_points() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_amplitude(-40.0) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn splits_at_silence_gaps() {
        let chunks = split_on_silence(&speech_with_gaps(), &SegmenterConfig::default());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[2].index, 2);
        // chunks are ordered and non-overlapping
        assert!(chunks[0].end_secs <= chunks[1].start_secs);
        assert!(chunks[1].end_secs <= chunks[2].start_secs);
    }

    #[test]
    fn splitting_is_deterministic() {
        let samples = speech_with_gaps();
        let cfg = SegmenterConfig::default();
        let first = split_on_silence(&samples, &cfg);
        let second = split_on_silence(&samples, &cfg);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.samples.len(), b.samples.len());
            assert_eq!(a.start_secs, b.start_secs);
            assert_eq!(a.end_secs, b.end_secs);
        }
    }

    #[test]
    fn no_silence_yields_single_chunk() {
        let samples = tone(3000, 0.5);
        let chunks = split_on_silence(&samples, &SegmenterConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].samples.len(), samples.len());
    }

    #[test]
    fn overlong_chunks_are_subdivided_evenly() {
        let samples = tone(5000, 0.5);
        let cfg = SegmenterConfig {
            max_chunk_ms: 2000,
            ..SegmenterConfig::default()
        };
        let chunks = split_on_silence(&samples, &cfg);
        assert_eq!(chunks.len(), 3);
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, samples.len());
        for chunk in &chunks {
            assert!(chunk.samples.len() <= ms_to_samples(2000) + 1);
        }
    }

    #[test]
    fn tiny_chunks_are_dropped() {
        let mut samples = Vec::new();
        samples.extend(tone(50, 0.5)); // below the 100 ms floor
        samples.extend(silence(800));
        samples.extend(tone(1000, 0.5));
        let cfg = SegmenterConfig {
            keep_silence_ms: 0,
            ..SegmenterConfig::default()
        };
        let chunks = split_on_silence(&samples, &cfg);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_on_silence(&[], &SegmenterConfig::default()).is_empty());
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn resample_halves_rate() {
        let samples: Vec<f32> = (0..32_000).map(|i| (i as f32 * 0.01).sin()).collect();
        let out = resample(&samples, 32_000, 16_000);
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn load_wav_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..1600 {
            writer
                .write_sample(((i as f32 * 0.3).sin() * 10_000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();

        let samples = load_wav_mono_16k(&path).unwrap();
        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"not a wav file").unwrap();
        let err = load_wav_mono_16k(&path).unwrap_err();
        assert!(matches!(err, SegmentationError::Decode { .. }));
        assert!(err.to_string().contains("ffmpeg"));
    }
}
