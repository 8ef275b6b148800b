//! Local-Accelerated backend: whisper.cpp with GPU offload (Metal on macOS, CUDA/
//! Vulkan elsewhere per the `gpu-metal`/`gpu-cuda`/`gpu-vulkan` Cargo features).
//! Differs from [`super::local_portable`] only in the `use_gpu` flag handed to
//! `WhisperCore` (spec.md §4.7 — "two local engine classes").

use super::whisper_common::WhisperCore;
use super::{TranscribeRequest, Transcriber};
use crate::error::TranscribeError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub struct LocalAcceleratedTranscriber {
    core: Arc<WhisperCore>,
}

impl LocalAcceleratedTranscriber {
    pub fn new(model_path: PathBuf) -> Result<Self, TranscribeError> {
        Ok(Self {
            core: Arc::new(WhisperCore::load(&model_path, true)?),
        })
    }
}

#[async_trait]
impl Transcriber for LocalAcceleratedTranscriber {
    async fn is_ready(&self) -> bool {
        true
    }

    async fn warm_up(&self) -> Result<(), TranscribeError> {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || {
            let silence = vec![0.0f32; crate::audio::SAMPLE_RATE as usize / 10];
            let _ = core.transcribe_blocking(&silence, "en", None);
        })
        .await
        .map_err(|e| TranscribeError::InferenceError(e.to_string()))
    }

    async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<String, TranscribeError> {
        let core = Arc::clone(&self.core);
        let samples = request.samples.to_vec();
        let language = request.language.to_string();
        let prompt = request.prompt.map(str::to_string);

        tokio::task::spawn_blocking(move || {
            core.transcribe_blocking(&samples, &language, prompt.as_deref())
        })
        .await
        .map_err(|e| TranscribeError::InferenceError(e.to_string()))?
    }
}
