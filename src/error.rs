//! Error taxonomy for dictation-core
//!
//! One enum per public component, aggregated here into [`DictationError`] via
//! `#[from]`. The controller is the single boundary that classifies backend-native
//! errors into the §7 taxonomy (PermissionMissing, NoAudio, ModelNotLoaded,
//! InferenceError, Network, Unauthorized, PayloadTooLarge, InternalInvariant) — see
//! `controller::classify`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DictationError>;

#[derive(Debug, Error)]
pub enum DictationError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Hotkey(#[from] HotkeyError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Transcribe(#[from] TranscribeError),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("keystore access failed: {0}")]
    StoreAccess(String),
    #[error("no secret is stored")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to open log file: {0}")]
    OpenFailed(String),
    #[error("failed to create log directory: {0}")]
    DirCreateFailed(String),
}

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("invalid key or modifier name: {0}")]
    InvalidKey(String),
    #[error("permission missing: {0}")]
    PermissionMissing(String),
    #[error("a shortcut is already bound")]
    AlreadyBound,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("device error: {0}")]
    DeviceError(String),
    #[error("capture produced no samples")]
    EmptyRecording,
}

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("model not loaded")]
    ModelNotLoaded,
    #[error("no audio to transcribe")]
    NoAudio,
    #[error("inference error: {0}")]
    InferenceError(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("payload too large")]
    PayloadTooLarge,
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("simulated-input permission denied")]
    PermissionDenied,
    #[error("clipboard access failed: {0}")]
    ClipboardFailed(String),
    #[error("keystroke synthesis failed: {0}")]
    SynthesisFailed(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    ReadFailed(String),
    #[error("failed to write settings file: {0}")]
    WriteFailed(String),
    #[error("failed to parse settings: {0}")]
    ParseFailed(String),
}
