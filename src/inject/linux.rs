//! Linux paste-keystroke synthesis via a native `evdev` uinput virtual device.
//! Replaces the teacher's `output/paste.rs` `ydotool` subprocess shell-out with an
//! in-process virtual keyboard — no daemon dependency, same Ctrl+V pair semantics
//! (spec.md §4.10 step 5).

use super::PasteSynthesizer;
use crate::error::InjectError;
use async_trait::async_trait;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use std::sync::Mutex;

pub struct UinputPasteSynthesizer {
    device: Mutex<VirtualDevice>,
}

impl UinputPasteSynthesizer {
    pub fn new() -> Result<Self, InjectError> {
        let device = build_device()
            .map_err(|e| InjectError::SynthesisFailed(format!("uinput device: {e}")))?;
        Ok(Self {
            device: Mutex::new(device),
        })
    }

    fn has_uinput_access() -> bool {
        std::fs::OpenOptions::new()
            .write(true)
            .open("/dev/uinput")
            .is_ok()
    }

    fn post_paste_blocking(device: &Mutex<VirtualDevice>) -> Result<(), InjectError> {
        let mut device = device.lock().unwrap_or_else(|p| p.into_inner());

        let events = [
            InputEvent::new(EventType::KEY, Key::KEY_LEFTCTRL.code(), 1),
            InputEvent::new(EventType::KEY, Key::KEY_V.code(), 1),
            InputEvent::new(EventType::KEY, Key::KEY_V.code(), 0),
            InputEvent::new(EventType::KEY, Key::KEY_LEFTCTRL.code(), 0),
        ];

        for event in events {
            device
                .emit(&[event])
                .map_err(|e| InjectError::SynthesisFailed(e.to_string()))?;
        }

        Ok(())
    }
}

fn build_device() -> std::io::Result<VirtualDevice> {
    let mut keys = AttributeSet::<Key>::new();
    keys.insert(Key::KEY_LEFTCTRL);
    keys.insert(Key::KEY_V);

    VirtualDeviceBuilder::new()?
        .name("dictation-core-paste")
        .with_keys(&keys)?
        .build()
}

#[async_trait]
impl PasteSynthesizer for UinputPasteSynthesizer {
    fn check_permission(&self) -> bool {
        Self::has_uinput_access()
    }

    async fn synthesize_paste(&self) -> Result<(), InjectError> {
        // Events must be posted from the same task that owns `device`'s lock for
        // the duration of the emit sequence, but emit() itself is a fast ioctl —
        // no need for spawn_blocking here.
        Self::post_paste_blocking(&self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paste_key_sequence_is_ctrl_then_v_then_release_v_then_release_ctrl() {
        let events = [
            InputEvent::new(EventType::KEY, Key::KEY_LEFTCTRL.code(), 1),
            InputEvent::new(EventType::KEY, Key::KEY_V.code(), 1),
            InputEvent::new(EventType::KEY, Key::KEY_V.code(), 0),
            InputEvent::new(EventType::KEY, Key::KEY_LEFTCTRL.code(), 0),
        ];
        assert_eq!(events[0].code(), Key::KEY_LEFTCTRL.code());
        assert_eq!(events[3].code(), Key::KEY_LEFTCTRL.code());
        assert_eq!(events[1].value(), 1);
        assert_eq!(events[2].value(), 0);
    }
}
