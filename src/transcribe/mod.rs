//! Speech-to-text transcription: two local whisper.cpp backend classes plus a remote
//! OpenAI-compatible HTTP backend, selected and timed by the Transcription Router
//! (spec.md §4.7/§4.8).

pub mod local_accelerated;
pub mod local_portable;
pub mod remote;
pub mod router;
mod whisper_common;

use crate::error::TranscribeError;
use async_trait::async_trait;

/// Everything a backend needs to condition a single transcription: the target
/// language (or "auto") and an optional prompt context built from custom vocabulary
/// plus the tail of the previous transcript (spec.md §4.8, §9 Open Questions —
/// truncated to 896 bytes pre-tokenization; see DESIGN.md).
pub struct TranscribeRequest<'a> {
    pub samples: &'a [f32],
    pub language: &'a str,
    pub prompt: Option<&'a str>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Cheap readiness probe — does not attempt to load a model.
    async fn is_ready(&self) -> bool;

    /// Eagerly loads the model/warms the connection so the first real request isn't
    /// penalized with load latency.
    async fn warm_up(&self) -> Result<(), TranscribeError>;

    async fn transcribe(&self, request: TranscribeRequest<'_>) -> Result<String, TranscribeError>;
}

pub const MAX_PROMPT_CHARS: usize = 896;
pub const PREVIOUS_TRANSCRIPT_TAIL_CHARS: usize = 200;

/// Builds the prompt context handed to a backend: custom vocabulary followed by the
/// tail of the previous transcript, truncated to `MAX_PROMPT_CHARS` characters before
/// the backend's own tokenizer ever sees it.
pub fn build_prompt(custom_vocabulary: &[String], previous_transcript: Option<&str>) -> Option<String> {
    let mut prompt = String::new();
    if !custom_vocabulary.is_empty() {
        prompt.push_str(&custom_vocabulary.join(", "));
    }
    if let Some(prev) = previous_transcript {
        let tail: String = prev
            .chars()
            .rev()
            .take(PREVIOUS_TRANSCRIPT_TAIL_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if !tail.is_empty() {
            if !prompt.is_empty() {
                prompt.push(' ');
            }
            prompt.push_str(&tail);
        }
    }
    if prompt.is_empty() {
        return None;
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        prompt = prompt.chars().take(MAX_PROMPT_CHARS).collect();
    }
    Some(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_prompt_none_when_nothing_to_say() {
        assert!(build_prompt(&[], None).is_none());
    }

    #[test]
    fn build_prompt_combines_vocabulary_and_previous_tail() {
        let vocab = vec!["Kubernetes".to_string(), "etcd".to_string()];
        let prompt = build_prompt(&vocab, Some("the quick brown fox")).unwrap();
        assert!(prompt.contains("Kubernetes"));
        assert!(prompt.contains("fox"));
    }

    #[test]
    fn build_prompt_truncates_to_max_chars() {
        let long = "a".repeat(MAX_PROMPT_CHARS * 2);
        let prompt = build_prompt(&[], Some(&long)).unwrap();
        assert!(prompt.chars().count() <= MAX_PROMPT_CHARS);
    }
}
