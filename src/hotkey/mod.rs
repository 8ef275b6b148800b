//! Global hotkey detection: dual backends selected per shortcut (spec.md §4.3/§4.4).
//!
//! An event-tap backend (`macos`/`evdev`) sees every keyboard event system-wide and is
//! required for modifiers-only shortcuts and the Fn key; it needs Accessibility
//! (macOS) or `input`-group (Linux) permission. A native-registration backend
//! (`native`, via the `global-hotkey` crate) asks the OS to own the shortcut and needs
//! no extra permission, but cannot represent a bare modifier chord. `Shortcut::
//! requires_event_tap` is the single place that decides which one a given shortcut
//! needs.

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod evdev;

pub mod native;

use crate::error::HotkeyError;
use crate::shortcut::{requires_event_tap, Shortcut};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events emitted by a hotkey backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    Pressed,
    Released,
    /// A modifiers-only shortcut's hold was interrupted by an unrelated key press
    /// before release — the backend treats this as "not a deliberate activation"
    /// rather than emitting `Released`.
    ModifierOnlyCanceled,
}

#[async_trait]
pub trait HotkeyListener: Send + Sync {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Owns the active backend for a configured shortcut and mediates backend swaps.
pub struct HotkeyEngine {
    shortcut: Shortcut,
    listener: Option<Box<dyn HotkeyListener>>,
    registered: bool,
}

impl HotkeyEngine {
    pub fn new(shortcut: Shortcut) -> Self {
        Self {
            shortcut,
            listener: None,
            registered: false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn shortcut(&self) -> Shortcut {
        self.shortcut
    }

    fn build_listener(&self) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
        if requires_event_tap(&self.shortcut) {
            event_tap_listener(self.shortcut)
        } else {
            Ok(Box::new(native::NativeListener::new(self.shortcut)?))
        }
    }

    /// Registers the configured shortcut, starting whichever backend it requires.
    /// Always unregisters any previously active backend first — there is no
    /// in-place handoff between backends (DESIGN.md Open Question decision).
    pub async fn register(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        if self.registered {
            return Err(HotkeyError::AlreadyBound);
        }
        let mut listener = self.build_listener()?;
        let rx = listener.start().await?;
        self.listener = Some(listener);
        self.registered = true;
        Ok(rx)
    }

    /// Swaps to a new shortcut, unregistering the current backend first.
    pub async fn rebind(&mut self, shortcut: Shortcut) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        self.suspend().await?;
        self.shortcut = shortcut;
        self.register().await
    }

    pub async fn suspend(&mut self) -> Result<(), HotkeyError> {
        if let Some(mut listener) = self.listener.take() {
            listener.stop().await?;
        }
        self.registered = false;
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        self.register().await
    }
}

#[cfg(target_os = "macos")]
fn event_tap_listener(shortcut: Shortcut) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(macos::MacEventTapListener::new(shortcut)?))
}

#[cfg(target_os = "linux")]
fn event_tap_listener(shortcut: Shortcut) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(evdev::EvdevListener::new(shortcut)?))
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn event_tap_listener(_shortcut: Shortcut) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Err(HotkeyError::BackendUnavailable(
        "no event-tap backend for this platform".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut::{MODIFIERS_ONLY, MOD_CONTROL, MOD_SHIFT, MOD_SUPER};

    #[test]
    fn modifiers_only_shortcut_requires_event_tap_listener_path() {
        let engine = HotkeyEngine::new(Shortcut::new(MODIFIERS_ONLY, MOD_SUPER));
        assert!(requires_event_tap(&engine.shortcut()));
    }

    #[test]
    fn chord_shortcut_prefers_native_listener_path() {
        let engine = HotkeyEngine::new(Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT));
        assert!(!requires_event_tap(&engine.shortcut()));
    }

    #[test]
    fn new_engine_starts_unregistered() {
        let engine = HotkeyEngine::new(Shortcut::default());
        assert!(!engine.is_registered());
    }
}
