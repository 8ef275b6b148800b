//! dictation-core: a low-latency, privacy-first push-to-talk dictation runtime.
//!
//! # Architecture
//!
//! ```text
//!                              ┌───────────────────┐
//!                              │     App Shell      │
//!                              └───────────────────┘
//!                                        │ constructs, in dependency order
//!        ┌──────────────┬───────────────┼───────────────┬──────────────┐
//!        ▼              ▼                ▼               ▼              ▼
//! ┌─────────────┐ ┌────────────┐ ┌──────────────┐ ┌─────────────┐ ┌────────────┐
//! │ Credential  │ │  Event Log │ │   Settings   │ │   Hotkey    │ │   Audio    │
//! │    Store    │ │            │ │    Store     │ │   Engine    │ │  Capture   │
//! └─────────────┘ └────────────┘ └──────────────┘ └─────────────┘ └────────────┘
//!                                                         │ key down/up/cancel
//!                                                         ▼
//!                                              ┌─────────────────────┐
//!                                              │ Dictation Controller │
//!                                              │ Idle→Recording→      │
//!                                              │ Transcribing→Idle     │
//!                                              └─────────────────────┘
//!                                                    │             │
//!                                                    ▼             ▼
//!                                         ┌─────────────────┐ ┌────────────┐
//!                                         │  Transcription   │ │    Text    │
//!                                         │      Router      │ │  Injector  │
//!                                         └─────────────────┘ └────────────┘
//!                                                    │
//!                                   ┌────────────────┼────────────────┐
//!                                   ▼                ▼                ▼
//!                         ┌────────────────┐ ┌──────────────┐ ┌─────────────┐
//!                         │ Local           │ │ Local        │ │  Remote     │
//!                         │ Accelerated     │ │ Portable     │ │  HTTP       │
//!                         └────────────────┘ └──────────────┘ └─────────────┘
//! ```
//!
//! The menu-bar icon, floating overlay, onboarding flow, settings-form UI, and
//! file-transcription/model-download CLI surfaces are outside this crate's scope; it
//! hosts exactly the state machine and subsystems above.

pub mod app;
pub mod audio;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod hotkey;
pub mod inject;
pub mod log;
pub mod session;
pub mod settings;
pub mod shortcut;
pub mod transcribe;

pub use controller::Controller;
pub use error::{DictationError, Result};
pub use settings::{Settings, SettingsStore};
