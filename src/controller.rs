//! Dictation Controller: the fused state machine tying hotkey events to capture →
//! transcribe → inject (spec.md §4.9). Generalizes the teacher's `state.rs` `State`
//! enum (`Idle`/`Recording{..}`/`Transcribing{..}`/`Outputting{..}`) and
//! `daemon.rs::run()`'s `tokio::select!` loop, trimmed of eager-chunk transcription,
//! output-mode/profile overrides, and meeting-mode branches — none of which survive
//! in SPEC_FULL.md.

use crate::audio::capture::AudioCapture;
use crate::audio::preprocess;
use crate::credentials::CredentialStore;
use crate::error::{InjectError, TranscribeError};
use crate::hotkey::HotkeyEvent;
use crate::inject::TextInjector;
use crate::log::EventLog;
use crate::settings::{Backend as SettingsBackend, HotkeyMode, Settings, SettingsStore};
use crate::transcribe::build_prompt;
use crate::transcribe::router::{BackendChoice, ModelFamily, RouterConfig, TranscriptionRouter};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Push-to-talk key-ups shorter than this are deferred, not cancelled (spec.md §4.9).
const MIN_HOLD: Duration = Duration::from_millis(300);

/// OpenAI-compatible default; the spec's User Settings table (§3) has no
/// `remote_endpoint` key, so the endpoint is a fixed constant rather than a user
/// preference (DESIGN.md Open Question decision).
const DEFAULT_REMOTE_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const REMOTE_TIMEOUT: Duration = Duration::from_secs(60);
const PREVIOUS_CONTEXT_TAIL_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Idle,
    Recording,
    Transcribing,
    Error(String),
}

impl State {
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, State::Recording)
    }
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Owns every subsystem the controller drives directly. The App Shell constructs one
/// of these and hands it the hotkey receiver; everything else is internal.
pub struct Controller {
    settings: Arc<SettingsStore>,
    audio: Box<dyn AudioCapture>,
    router: Arc<TranscriptionRouter>,
    injector: Option<TextInjector>,
    credentials: CredentialStore,
    log: EventLog,
    models_dir: PathBuf,
    state: State,
    recording_started_at: Option<Instant>,
    previous_context: Option<String>,
    /// Preserved after a terminal Error for at least one subsequent interaction
    /// (spec.md §7 "User-visible failure behavior").
    last_error: Option<String>,
}

impl Controller {
    pub fn new(
        settings: Arc<SettingsStore>,
        audio: Box<dyn AudioCapture>,
        router: Arc<TranscriptionRouter>,
        injector: Option<TextInjector>,
        credentials: CredentialStore,
        log: EventLog,
        models_dir: PathBuf,
    ) -> Self {
        Self {
            settings,
            audio,
            router,
            injector,
            credentials,
            log,
            models_dir,
            state: State::Idle,
            recording_started_at: None,
            previous_context: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Drains `hotkey_rx` until the channel closes (hotkey engine torn down on
    /// shutdown). This is the controller's entire public surface for driving state;
    /// everything else happens as a side effect of hotkey events.
    pub async fn run(&mut self, mut hotkey_rx: mpsc::Receiver<HotkeyEvent>) {
        while let Some(event) = hotkey_rx.recv().await {
            self.handle_hotkey_event(event).await;
        }
    }

    /// Entry point for an App Shell driving its own `tokio::select!` loop (e.g. one
    /// that also watches for settings-driven hotkey rebinds and shutdown signals)
    /// rather than handing the controller a single fixed receiver via [`Controller::run`].
    pub async fn handle_event(&mut self, event: HotkeyEvent) {
        self.handle_hotkey_event(event).await;
    }

    async fn handle_hotkey_event(&mut self, event: HotkeyEvent) {
        let mode = self.settings.get().hotkey_mode;
        match (event, mode) {
            (HotkeyEvent::Pressed, HotkeyMode::PushToTalk) => {
                if self.state.is_idle() {
                    self.start_recording().await;
                }
            }
            (HotkeyEvent::Released, HotkeyMode::PushToTalk) => {
                if self.state.is_recording() {
                    self.defer_for_minimum_hold().await;
                    self.stop_and_transcribe().await;
                }
            }
            (HotkeyEvent::Pressed, HotkeyMode::Toggle) => {
                if self.state.is_idle() {
                    self.start_recording().await;
                } else if self.state.is_recording() {
                    self.stop_and_transcribe().await;
                }
                // Transcribing/Error: a second toggle press is ignored (spec.md §5).
            }
            (HotkeyEvent::Released, HotkeyMode::Toggle) => {
                // Toggle mode has no release semantics.
            }
            (HotkeyEvent::ModifierOnlyCanceled, _) => {
                // A candidate modifier-only hold was interrupted before release — not a
                // deliberate activation (spec.md §4.4); nothing was ever started.
            }
        }
    }

    /// If less than 300 ms elapsed since key-down, sleeps out the remainder before the
    /// caller proceeds to stop. There is no cancellation path for this deferral — a
    /// subsequent key-down cannot interrupt it (spec.md §4.9 "Minimum hold").
    async fn defer_for_minimum_hold(&self) {
        if let Some(started) = self.recording_started_at {
            let elapsed = started.elapsed();
            if elapsed < MIN_HOLD {
                tokio::time::sleep(MIN_HOLD - elapsed).await;
            }
        }
    }

    async fn start_recording(&mut self) {
        self.audio.clear_retained();
        if let Err(e) = self.audio.start().await {
            self.log.warn(
                "Audio",
                "start_failed",
                fields(&[("error", json!(e.to_string()))]),
            );
            self.enter_error(format!("microphone error: {e}"));
            return;
        }
        self.recording_started_at = Some(Instant::now());
        self.log.begin_dictation_session();
        self.state = State::Recording;
        self.log.info("Dictation", "recording_started", Map::new());
    }

    async fn stop_and_transcribe(&mut self) {
        let recording_ms = self
            .recording_started_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let samples = self.audio.stop().await;
        self.state = State::Transcribing;
        self.log.debug(
            "Dictation",
            "transcribing",
            fields(&[("samples", json!(samples.len()))]),
        );
        self.run_transcription(samples, recording_ms).await;
    }

    /// Runs preprocessing, the empty-transcript short-circuit, and dispatch to the
    /// router (spec.md §4.9 "Preprocessing"/"Retry"/"Injection"/"Logging").
    async fn run_transcription(&mut self, samples: Vec<f32>, recording_ms: u64) {
        let trimmed = preprocess::preprocess(&samples, crate::audio::SAMPLE_RATE);
        if trimmed.is_empty() {
            self.log
                .info("Transcription", "empty_after_preprocessing", Map::new());
            self.audio.clear_retained();
            self.finish_success(String::new(), recording_ms, 0, samples.len())
                .await;
            return;
        }

        let settings = self.settings.get();
        let config = self.build_router_config(&settings);
        let prompt = build_prompt(&[], self.previous_context.as_deref());

        let started = Instant::now();
        let mut outcome = self
            .router
            .transcribe(&config, &trimmed, &settings.language, prompt.as_deref())
            .await;

        // spec.md §7: "ModelNotLoaded/BackendBusy: router retries warm-up once; on
        // second failure, surfaces Error." The router itself only warms up on a
        // backend switch, so the controller supplies the one extra attempt here.
        if let Err(TranscribeError::ModelNotLoaded) = &outcome {
            self.log
                .warn("Transcription", "model_not_loaded_retry", Map::new());
            outcome = self
                .router
                .transcribe(&config, &trimmed, &settings.language, prompt.as_deref())
                .await;
        }

        let transcription_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.audio.clear_retained();
                self.finish_success(result.text, recording_ms, transcription_ms, trimmed.len())
                    .await;
            }
            Err(e) => {
                self.finish_failure(e, recording_ms, transcription_ms, trimmed.len())
                    .await;
            }
        }
    }

    /// Exposed so the App Shell (or a future UI surface) can retry a failed dictation
    /// without asking the user to redictate. Re-runs preprocessing and dispatch on the
    /// Retained Utterance — the audio buffer itself is untouched by a failed attempt.
    pub async fn retry_last_transcription(&mut self) {
        let Some(samples) = self.audio.retained() else {
            self.log
                .debug("Transcription", "retry_with_no_retained_utterance", Map::new());
            return;
        };
        self.state = State::Transcribing;
        self.run_transcription(samples, 0).await;
    }

    async fn finish_success(
        &mut self,
        text: String,
        recording_ms: u64,
        transcription_ms: u64,
        samples: usize,
    ) {
        let settings = self.settings.get();
        let result_chars = text.chars().count();

        if !text.is_empty() {
            self.previous_context = Some(tail_chars(&text, PREVIOUS_CONTEXT_TAIL_CHARS));
            self.inject_or_clipboard(&text, &settings).await;
        }

        self.log.info(
            "Dictation",
            "dictation_complete",
            fields(&[
                ("recording_ms", json!(recording_ms)),
                ("transcription_ms", json!(transcription_ms)),
                ("samples", json!(samples)),
                ("backend", json!(backend_label(&settings))),
                ("language", json!(settings.language)),
                ("result_chars", json!(result_chars)),
                ("success", json!(true)),
            ]),
        );
        self.last_error = None;
        self.state = State::Idle;
        self.log.end_dictation_session();
    }

    async fn finish_failure(
        &mut self,
        error: TranscribeError,
        recording_ms: u64,
        transcription_ms: u64,
        samples: usize,
    ) {
        let settings = self.settings.get();
        let (keep_retained, message) = classify(&error);
        if !keep_retained {
            self.audio.clear_retained();
        }

        self.log.error(
            "Transcription",
            "failed",
            fields(&[
                ("recording_ms", json!(recording_ms)),
                ("transcription_ms", json!(transcription_ms)),
                ("samples", json!(samples)),
                ("backend", json!(backend_label(&settings))),
                ("language", json!(settings.language)),
                ("error", json!(message)),
                ("success", json!(false)),
            ]),
        );

        // §7's propagation policy: state = Error(msg) briefly, then Idle. The message
        // itself survives in `last_error` for the caller to surface afterward.
        self.state = State::Error(message.clone());
        self.last_error = Some(message);
        self.state = State::Idle;
        self.log.end_dictation_session();
    }

    /// spec.md §4.9 "Injection": auto_paste routes through the Text Injector;
    /// PermissionDenied is a non-fatal warning that leaves the transcript on the
    /// clipboard (the injector's own contract always restores the prior clipboard on
    /// every exit path, including permission failure, so the controller re-writes it
    /// here to honor this higher-level policy). auto_paste=false just writes the
    /// clipboard with no restore.
    async fn inject_or_clipboard(&self, text: &str, settings: &Settings) {
        if settings.auto_paste {
            if let Some(injector) = &self.injector {
                match injector.paste(text).await {
                    Ok(()) => return,
                    Err(InjectError::PermissionDenied) => {
                        self.log.warn(
                            "Injection",
                            "permission_missing",
                            Map::new(),
                        );
                    }
                    Err(e) => {
                        self.log.warn(
                            "Injection",
                            "failed",
                            fields(&[("error", json!(e.to_string()))]),
                        );
                    }
                }
            }
        }
        self.write_clipboard_best_effort(text);
    }

    fn write_clipboard_best_effort(&self, text: &str) {
        match arboard::Clipboard::new() {
            Ok(mut clipboard) => {
                if let Err(e) = clipboard.set_text(text.to_string()) {
                    self.log.warn(
                        "Injection",
                        "clipboard_write_failed",
                        fields(&[("error", json!(e.to_string()))]),
                    );
                }
            }
            Err(e) => {
                self.log.warn(
                    "Injection",
                    "clipboard_unavailable",
                    fields(&[("error", json!(e.to_string()))]),
                );
            }
        }
    }

    fn enter_error(&mut self, message: String) {
        self.state = State::Error(message.clone());
        self.last_error = Some(message);
        self.state = State::Idle;
    }

    /// Model family selection is a model-catalog concern out of scope per spec.md
    /// §1/§6; the heuristic from `transcribe::router`'s own doc comment (generic
    /// models run accelerated, language-specialized models for a non-default language
    /// run portable) is applied here using the language setting as the only signal
    /// available to the controller.
    fn build_router_config(&self, settings: &Settings) -> RouterConfig {
        let model_family = if settings.language == "en" || settings.language == "auto" {
            ModelFamily::Accelerated
        } else {
            ModelFamily::Portable
        };
        let backend = match settings.backend {
            SettingsBackend::Local => BackendChoice::Local,
            SettingsBackend::Remote => BackendChoice::Remote,
        };
        let remote_api_key = self.credentials.load().ok().flatten();

        RouterConfig {
            backend,
            model_family,
            local_model_path: self.models_dir.join(format!("{}.bin", settings.model)),
            remote_endpoint: DEFAULT_REMOTE_ENDPOINT.to_string(),
            remote_model: settings.model.clone(),
            remote_api_key,
            remote_timeout: REMOTE_TIMEOUT,
        }
    }
}

/// Classifies a `TranscribeError` into the §7 taxonomy's two controller-relevant
/// facets: whether the Retained Utterance survives for `retry_last_transcription()`,
/// and the user-facing message. `NoAudio` never reaches here — it's short-circuited
/// before dispatch — but is handled defensively rather than panicking.
fn classify(error: &TranscribeError) -> (bool, String) {
    match error {
        TranscribeError::NoAudio => (false, String::new()),
        TranscribeError::Unauthorized => {
            (false, "authentication failed; check your API key".to_string())
        }
        TranscribeError::ModelNotLoaded => (true, "the model failed to load".to_string()),
        TranscribeError::InferenceError(msg) => (true, format!("transcription failed: {msg}")),
        TranscribeError::Network(msg) => (true, format!("network error: {msg}")),
        TranscribeError::PayloadTooLarge => {
            (true, "recording exceeds the remote endpoint's size limit".to_string())
        }
    }
}

fn backend_label(settings: &Settings) -> &'static str {
    match settings.backend {
        SettingsBackend::Local => {
            if settings.language == "en" || settings.language == "auto" {
                "local-accelerated"
            } else {
                "local-portable"
            }
        }
        SettingsBackend::Remote => "remote",
    }
}

/// Last `n` Unicode scalar values of `s`, used both for the previous-context carry and
/// as a building block the prompt module mirrors (spec.md §4.9 "Prompt context").
fn tail_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().rev().take(n).collect();
    chars.into_iter().rev().collect()
}

fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn state_defaults_to_idle() {
        assert_eq!(State::default(), State::Idle);
    }

    #[test]
    fn tail_chars_keeps_only_the_last_n() {
        let s = "a".repeat(500);
        assert_eq!(tail_chars(&s, 200).chars().count(), 200);
        assert_eq!(tail_chars("hello", 200), "hello");
    }

    #[test]
    fn classify_unauthorized_does_not_keep_retained() {
        let (keep, msg) = classify(&TranscribeError::Unauthorized);
        assert!(!keep);
        assert!(!msg.is_empty());
    }

    #[test]
    fn classify_inference_error_keeps_retained() {
        let (keep, _) = classify(&TranscribeError::InferenceError("boom".into()));
        assert!(keep);
    }

    #[test]
    fn classify_network_keeps_retained() {
        let (keep, _) = classify(&TranscribeError::Network("timeout".into()));
        assert!(keep);
    }

    #[test]
    fn classify_payload_too_large_keeps_retained() {
        let (keep, _) = classify(&TranscribeError::PayloadTooLarge);
        assert!(keep);
    }

    #[test]
    fn classify_model_not_loaded_keeps_retained() {
        let (keep, _) = classify(&TranscribeError::ModelNotLoaded);
        assert!(keep);
    }

    #[test]
    fn backend_label_reflects_language_heuristic() {
        let mut settings = Settings::default();
        settings.backend = SettingsBackend::Local;
        settings.language = "en".to_string();
        assert_eq!(backend_label(&settings), "local-accelerated");
        settings.language = "de".to_string();
        assert_eq!(backend_label(&settings), "local-portable");
        settings.backend = SettingsBackend::Remote;
        assert_eq!(backend_label(&settings), "remote");
    }

    struct FakeAudioCapture {
        started: StdMutex<bool>,
        stop_samples: Vec<f32>,
        retained: StdMutex<Option<Vec<f32>>>,
    }

    #[async_trait]
    impl AudioCapture for FakeAudioCapture {
        async fn start(&mut self) -> Result<(), AudioError> {
            *self.started.lock().unwrap() = true;
            Ok(())
        }

        async fn stop(&mut self) -> Vec<f32> {
            *self.retained.lock().unwrap() = Some(self.stop_samples.clone());
            self.stop_samples.clone()
        }

        fn clear_retained(&mut self) {
            *self.retained.lock().unwrap() = None;
        }

        fn retained(&self) -> Option<Vec<f32>> {
            self.retained.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn build_router_config_picks_portable_for_non_default_language() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(
            SettingsStore::load(dir.path().join("settings.toml")).unwrap(),
        );
        settings.update(|s| s.language = "ja".to_string()).unwrap();

        let audio: Box<dyn AudioCapture> = Box::new(FakeAudioCapture {
            started: StdMutex::new(false),
            stop_samples: Vec::new(),
            retained: StdMutex::new(None),
        });
        let controller = Controller::new(
            settings.clone(),
            audio,
            Arc::new(TranscriptionRouter::new()),
            None,
            CredentialStore::new(),
            EventLog::start(
                dir.path().to_path_buf(),
                "test".to_string(),
                crate::session::new_app_session_id(),
            )
            .unwrap(),
            dir.path().to_path_buf(),
        );

        let config = controller.build_router_config(&settings.get());
        assert_eq!(config.model_family, ModelFamily::Portable);
    }
}
