//! Shared whisper.cpp inference core for both local backend classes. Adapted from
//! the teacher's `transcribe/whisper.rs`: same `WhisperContext`/`FullParams` shape,
//! generalized to take a prompt string (custom vocabulary + previous-transcript tail)
//! and an explicit accelerated/portable GPU flag instead of a single fixed config.

use crate::error::TranscribeError;
use std::path::PathBuf;
use std::sync::Mutex;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

pub struct WhisperCore {
    ctx: Mutex<WhisperContext>,
    threads: i32,
}

impl WhisperCore {
    pub fn load(model_path: &PathBuf, use_gpu: bool) -> Result<Self, TranscribeError> {
        let mut params = WhisperContextParameters::default();
        params.use_gpu = use_gpu;

        let path = model_path
            .to_str()
            .ok_or_else(|| TranscribeError::ModelNotLoaded)?;

        let ctx = WhisperContext::new_with_params(path, params)
            .map_err(|e| TranscribeError::InferenceError(e.to_string()))?;

        let threads = num_cpus::get().min(4) as i32;

        Ok(Self {
            ctx: Mutex::new(ctx),
            threads,
        })
    }

    /// Synchronous, CPU-bound inference — callers run this inside
    /// `spawn_blocking` so it doesn't stall the async runtime.
    pub fn transcribe_blocking(
        &self,
        samples: &[f32],
        language: &str,
        prompt: Option<&str>,
    ) -> Result<String, TranscribeError> {
        if samples.is_empty() {
            return Err(TranscribeError::NoAudio);
        }

        let ctx = self.ctx.lock().unwrap_or_else(|p| p.into_inner());
        let mut state = ctx
            .create_state()
            .map_err(|e| TranscribeError::InferenceError(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        if language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(language));
        }
        if let Some(prompt) = prompt {
            params.set_initial_prompt(prompt);
        }

        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_suppress_blank(true);
        params.set_suppress_nst(true);

        let duration_secs = samples.len() as f32 / crate::audio::SAMPLE_RATE as f32;
        if duration_secs < 30.0 {
            params.set_single_segment(true);
        }
        if let Some(audio_ctx) = audio_ctx_for_duration(duration_secs) {
            params.set_audio_ctx(audio_ctx);
        }

        state
            .full(params, samples)
            .map_err(|e| TranscribeError::InferenceError(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            if let Ok(s) = segment.to_str() {
                text.push_str(s);
            }
        }

        Ok(text.trim().to_string())
    }
}

/// Context-window optimization for short clips (≤22.5s): duration_seconds * 50 + 64.
fn audio_ctx_for_duration(duration_secs: f32) -> Option<i32> {
    if duration_secs <= 22.5 {
        Some((duration_secs * 50.0) as i32 + 64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_ctx_set_for_short_clips_only() {
        assert!(audio_ctx_for_duration(5.0).is_some());
        assert!(audio_ctx_for_duration(30.0).is_none());
    }
}
