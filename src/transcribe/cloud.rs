use std::io::Cursor;
use std::time::Duration;

use reqwest::blocking::multipart;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::audio::{AudioChunk, TARGET_SAMPLE_RATE};
use crate::transcribe::{Transcriber, TranscriptionError};

/// Sends chunk audio to an OpenAI-compatible `/v1/audio/transcriptions`.
pub struct CloudTranscriber {
    api_key: String,
    model: String,
    endpoint: String,
    language: Option<String>,
    client: reqwest::blocking::Client,
}

impl CloudTranscriber {
    pub fn new(
        api_key: Option<String>,
        model: String,
        endpoint: String,
        language: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        let api_key = api_key.ok_or_else(|| {
            TranscriptionError::Service(
                "missing API key (set --cloud-api-key or OPENAI_API_KEY)".into(),
            )
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("tubescribe/0.1")
            .build()
            .map_err(|err| TranscriptionError::Service(err.to_string()))?;

        Ok(Self {
            api_key,
            model,
            endpoint,
            language,
            client,
        })
    }
}

/// Whether an HTTP status points at the service (retry later) rather than at
/// the audio we sent.
fn is_service_fault(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
}

impl Transcriber for CloudTranscriber {
    fn transcribe(&mut self, chunk: &AudioChunk) -> Result<String, TranscriptionError> {
        if chunk.samples.is_empty() {
            return Ok(String::new());
        }

        let wav = chunk_wav_bytes(&chunk.samples)
            .map_err(|err| TranscriptionError::Inference(err.to_string()))?;
        let file_part = multipart::Part::bytes(wav)
            .file_name(format!("chunk_{}.wav", chunk.index))
            .mime_str("audio/wav")
            .map_err(|err| TranscriptionError::Inference(err.to_string()))?;

        let mut form = multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone());
        if let Some(lang) = self.language.as_ref() {
            form = form.text("language", lang.clone());
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|err| TranscriptionError::Service(format!("POST {}: {err}", self.endpoint)))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|err| TranscriptionError::Service(err.to_string()))?;

        if !status.is_success() {
            let detail = format!("HTTP {status}: {body}");
            return Err(if is_service_fault(status) {
                TranscriptionError::Service(detail)
            } else {
                TranscriptionError::Unintelligible(detail)
            });
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|err| TranscriptionError::Service(format!("bad response body: {err}")))?;
        Ok(parsed.text)
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Encodes chunk samples as an in-memory 16 kHz mono 16-bit WAV.
fn chunk_wav_bytes(samples: &[f32]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_faults_mean_retry_later() {
        assert!(is_service_fault(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_service_fault(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_service_fault(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_service_fault(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn client_faults_blame_the_audio() {
        assert!(!is_service_fault(StatusCode::BAD_REQUEST));
        assert!(!is_service_fault(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn response_body_parses() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "hello there"}"#).unwrap();
        assert_eq!(parsed.text, "hello there");
    }

    #[test]
    fn wav_encoding_produces_riff_header() {
        let bytes = chunk_wav_bytes(&[0.0, 0.5, -0.5]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 3 samples * 2 bytes of payload
        assert_eq!(bytes.len(), 44 + 6);
    }

    #[test]
    fn missing_api_key_is_a_service_error() {
        let err = CloudTranscriber::new(None, "whisper-1".into(), "http://x".into(), None)
            .err()
            .unwrap();
        assert!(matches!(err, TranscriptionError::Service(_)));
    }
}
