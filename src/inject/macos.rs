//! macOS paste-keystroke synthesis via CGEvent. Grounded on the teacher's
//! `output/cgevent.rs`: same `CGEventSource`/`CGEvent::new_keyboard_event`/`.post`
//! shape, narrowed from full character-by-character typing down to a single
//! Cmd+V key-down/key-up pair (spec.md §4.10 step 5).

use super::PasteSynthesizer;
use crate::error::InjectError;
use async_trait::async_trait;
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGKeyCode};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

const KEYCODE_V: CGKeyCode = 0x09;

pub struct CGEventPasteSynthesizer;

impl CGEventPasteSynthesizer {
    pub fn new() -> Self {
        Self
    }

    fn check_accessibility_permission() -> bool {
        #[link(name = "ApplicationServices", kind = "framework")]
        extern "C" {
            fn AXIsProcessTrusted() -> bool;
        }
        unsafe { AXIsProcessTrusted() }
    }

    fn post_paste_blocking() -> Result<(), InjectError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| InjectError::SynthesisFailed("failed to create CGEventSource".into()))?;

        let key_down = CGEvent::new_keyboard_event(source.clone(), KEYCODE_V, true)
            .map_err(|_| InjectError::SynthesisFailed("failed to create key down event".into()))?;
        let key_up = CGEvent::new_keyboard_event(source, KEYCODE_V, false)
            .map_err(|_| InjectError::SynthesisFailed("failed to create key up event".into()))?;

        key_down.set_flags(CGEventFlags::CGEventFlagCommand);
        key_up.set_flags(CGEventFlags::CGEventFlagCommand);

        key_down.post(CGEventTapLocation::HID);
        key_up.post(CGEventTapLocation::HID);

        Ok(())
    }
}

impl Default for CGEventPasteSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PasteSynthesizer for CGEventPasteSynthesizer {
    fn check_permission(&self) -> bool {
        Self::check_accessibility_permission()
    }

    async fn synthesize_paste(&self) -> Result<(), InjectError> {
        tokio::task::spawn_blocking(Self::post_paste_blocking)
            .await
            .map_err(|e| InjectError::SynthesisFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycode_v_matches_us_layout() {
        assert_eq!(KEYCODE_V, 0x09);
    }
}
