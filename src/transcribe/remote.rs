//! Remote transcription backend: an OpenAI-compatible HTTP API (spec.md §4.7).
//! Adapted from the teacher's `transcribe/remote.rs`: same WAV-encode +
//! multipart-form-over-`ureq` shape, generalized to map HTTP status onto the §7
//! taxonomy (401 → Unauthorized, 413 or a local pre-flight size check → PayloadTooLarge)
//! and to run inside `spawn_blocking` so the async `Transcriber` trait can still
//! cancel an in-flight request at an `.await` point.

use super::{TranscribeRequest, Transcriber};
use crate::error::TranscribeError;
use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;

/// Matches the limit most OpenAI-compatible servers enforce; checked locally so a
/// too-large recording fails fast with `PayloadTooLarge` instead of waiting on a
/// round trip.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub struct RemoteTranscriber {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteTranscriber {
    pub fn new(endpoint: String, model: String, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            endpoint,
            model,
            api_key,
            timeout,
        }
    }

    fn encode_wav(samples: &[f32]) -> Result<Vec<u8>, TranscribeError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: crate::audio::SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buffer = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut buffer, spec)
            .map_err(|e| TranscribeError::InferenceError(e.to_string()))?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(|e| TranscribeError::InferenceError(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| TranscribeError::InferenceError(e.to_string()))?;
        Ok(buffer.into_inner())
    }

    fn build_multipart(&self, wav: &[u8], language: &str, prompt: Option<&str>) -> (String, Vec<u8>) {
        let boundary = format!(
            "----dictation-core-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let mut body = Vec::new();

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"audio.wav\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: audio/wav\r\n\r\n");
        body.extend_from_slice(wav);
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"model\"\r\n\r\n");
        body.extend_from_slice(self.model.as_bytes());
        body.extend_from_slice(b"\r\n");

        if language != "auto" {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Disposition: form-data; name=\"language\"\r\n\r\n");
            body.extend_from_slice(language.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        if let Some(prompt) = prompt {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(b"Content-Disposition: form-data; name=\"prompt\"\r\n\r\n");
            body.extend_from_slice(prompt.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"response_format\"\r\n\r\n");
        body.extend_from_slice(b"json\r\n");
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        (boundary, body)
    }

    fn send_blocking(
        &self,
        samples: &[f32],
        language: &str,
        prompt: Option<&str>,
    ) -> Result<String, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::NoAudio);
        }

        let wav = Self::encode_wav(samples)?;
        if wav.len() > MAX_UPLOAD_BYTES {
            return Err(TranscribeError::PayloadTooLarge);
        }

        let (boundary, body) = self.build_multipart(&wav, language, prompt);
        let url = format!("{}/v1/audio/transcriptions", self.endpoint.trim_end_matches('/'));

        let mut request = ureq::post(&url).timeout(self.timeout).set(
            "Content-Type",
            &format!("multipart/form-data; boundary={boundary}"),
        );
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        let response = request.send_bytes(&body).map_err(|e| match e {
            ureq::Error::Status(401, _) => TranscribeError::Unauthorized,
            ureq::Error::Status(413, _) => TranscribeError::PayloadTooLarge,
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                TranscribeError::Network(format!("server returned {code}: {body}"))
            }
            ureq::Error::Transport(t) => TranscribeError::Network(t.to_string()),
        })?;

        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| TranscribeError::Network(format!("malformed response: {e}")))?;

        json.get("text")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| TranscribeError::Network("response missing 'text' field".into()))
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn is_ready(&self) -> bool {
        !self.endpoint.is_empty()
    }

    async fn warm_up(&self) -> Result<(), TranscribeError> {
        // No persistent connection to prime; readiness is checked lazily per request.
        Ok(())
    }

    async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<String, TranscribeError> {
        let samples = request.samples.to_vec();
        let language = request.language.to_string();
        let prompt = request.prompt.map(str::to_string);
        let endpoint = self.endpoint.clone();
        let model = self.model.clone();
        let api_key = self.api_key.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let transcriber = RemoteTranscriber::new(endpoint, model, api_key, timeout);
            transcriber.send_blocking(&samples, &language, prompt.as_deref())
        })
        .await
        .map_err(|e| TranscribeError::InferenceError(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_wav_produces_valid_header() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.01).sin()).collect();
        let wav = RemoteTranscriber::encode_wav(&samples).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn oversized_payload_rejected_before_network() {
        let transcriber = RemoteTranscriber::new(
            "http://localhost:8080".into(),
            "whisper-1".into(),
            None,
            Duration::from_secs(5),
        );
        let samples = vec![0.0f32; MAX_UPLOAD_BYTES]; // far more samples than fit after WAV encode
        let result = transcriber.send_blocking(&samples, "en", None);
        assert!(matches!(result, Err(TranscribeError::PayloadTooLarge)));
    }

    #[test]
    fn empty_samples_rejected_as_no_audio() {
        let transcriber = RemoteTranscriber::new(
            "http://localhost:8080".into(),
            "whisper-1".into(),
            None,
            Duration::from_secs(5),
        );
        let result = transcriber.send_blocking(&[], "en", None);
        assert!(matches!(result, Err(TranscribeError::NoAudio)));
    }

    #[test]
    fn multipart_includes_prompt_field_when_present() {
        let transcriber = RemoteTranscriber::new(
            "http://localhost:8080".into(),
            "whisper-1".into(),
            None,
            Duration::from_secs(5),
        );
        let (_, body) = transcriber.build_multipart(b"RIFF....", "en", Some("Kubernetes"));
        let body_str = String::from_utf8_lossy(&body);
        assert!(body_str.contains("name=\"prompt\""));
        assert!(body_str.contains("Kubernetes"));
    }
}
