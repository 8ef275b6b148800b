//! Native-registration hotkey backend via the `global-hotkey` crate: the OS owns the
//! shortcut, so no Accessibility/`input`-group permission is needed, but a bare
//! modifier chord cannot be represented (spec.md §4.3 — `Shortcut::requires_event_tap`
//! routes those to the event-tap backends instead). Grounded on
//! `other_examples/Automaat-whisper-hotkey`'s `HotkeyManager`: a single
//! `GlobalHotKeyManager`, `HotKey::new(modifiers, code)` registration, and dispatch off
//! `GlobalHotKeyEvent::receiver()` keyed by hotkey id — generalized from that example's
//! fixed letter-only key parsing to the full `Shortcut` bitset (letters, digits, space).

use super::{HotkeyEvent, HotkeyListener};
use crate::error::HotkeyError;
use crate::shortcut::{self, Shortcut};
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub struct NativeListener {
    shortcut: Shortcut,
    stop_signal: Option<oneshot::Sender<()>>,
    stop_flag: Arc<AtomicBool>,
}

impl NativeListener {
    pub fn new(shortcut: Shortcut) -> Result<Self, HotkeyError> {
        if shortcut.is_modifiers_only() {
            return Err(HotkeyError::InvalidKey(
                "modifiers-only shortcuts require the event-tap backend".into(),
            ));
        }
        Ok(Self {
            shortcut,
            stop_signal: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn modifiers_from_bits(bits: u32) -> Modifiers {
    let mut m = Modifiers::empty();
    if bits & shortcut::MOD_CONTROL != 0 {
        m |= Modifiers::CONTROL;
    }
    if bits & shortcut::MOD_ALT != 0 {
        m |= Modifiers::ALT;
    }
    if bits & shortcut::MOD_SHIFT != 0 {
        m |= Modifiers::SHIFT;
    }
    if bits & shortcut::MOD_SUPER != 0 {
        m |= Modifiers::SUPER;
    }
    m
}

fn code_for_key(key_code: i32) -> Result<Code, HotkeyError> {
    let code = match key_code as u8 as char {
        'a' | 'A' => Code::KeyA,
        'b' | 'B' => Code::KeyB,
        'c' | 'C' => Code::KeyC,
        'd' | 'D' => Code::KeyD,
        'e' | 'E' => Code::KeyE,
        'f' | 'F' => Code::KeyF,
        'g' | 'G' => Code::KeyG,
        'h' | 'H' => Code::KeyH,
        'i' | 'I' => Code::KeyI,
        'j' | 'J' => Code::KeyJ,
        'k' | 'K' => Code::KeyK,
        'l' | 'L' => Code::KeyL,
        'm' | 'M' => Code::KeyM,
        'n' | 'N' => Code::KeyN,
        'o' | 'O' => Code::KeyO,
        'p' | 'P' => Code::KeyP,
        'q' | 'Q' => Code::KeyQ,
        'r' | 'R' => Code::KeyR,
        's' | 'S' => Code::KeyS,
        't' | 'T' => Code::KeyT,
        'u' | 'U' => Code::KeyU,
        'v' | 'V' => Code::KeyV,
        'w' | 'W' => Code::KeyW,
        'x' | 'X' => Code::KeyX,
        'y' | 'Y' => Code::KeyY,
        'z' | 'Z' => Code::KeyZ,
        '0' => Code::Digit0,
        '1' => Code::Digit1,
        '2' => Code::Digit2,
        '3' => Code::Digit3,
        '4' => Code::Digit4,
        '5' => Code::Digit5,
        '6' => Code::Digit6,
        '7' => Code::Digit7,
        '8' => Code::Digit8,
        '9' => Code::Digit9,
        ' ' => Code::Space,
        other => {
            return Err(HotkeyError::InvalidKey(format!(
                "key '{other}' is not registrable with the native backend"
            )))
        }
    };
    Ok(code)
}

#[async_trait::async_trait]
impl HotkeyListener for NativeListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);
        self.stop_flag.store(false, Ordering::SeqCst);

        let code = code_for_key(self.shortcut.key_code)?;
        let modifiers = modifiers_from_bits(self.shortcut.modifiers);
        let hotkey = HotKey::new(Some(modifiers), code);

        let manager = GlobalHotKeyManager::new()
            .map_err(|e| HotkeyError::BackendUnavailable(e.to_string()))?;
        manager
            .register(hotkey)
            .map_err(|e| HotkeyError::BackendUnavailable(e.to_string()))?;

        let hotkey_id = hotkey.id();
        let stop_flag = Arc::clone(&self.stop_flag);

        tokio::task::spawn_blocking(move || {
            // Keep the manager alive for the listener's lifetime; registrations are
            // torn down when it drops.
            let _manager = manager;
            let _ = stop_rx;
            let receiver = GlobalHotKeyEvent::receiver();
            loop {
                if stop_flag.load(Ordering::SeqCst) {
                    return;
                }
                match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                    Ok(event) => {
                        let mapped = if event.id == hotkey_id {
                            match event.state {
                                HotKeyState::Pressed => Some(HotkeyEvent::Pressed),
                                HotKeyState::Released => Some(HotkeyEvent::Released),
                            }
                        } else {
                            None
                        };
                        if let Some(event) = mapped {
                            if tx.blocking_send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut::{MODIFIERS_ONLY, MOD_CONTROL, MOD_SHIFT, MOD_SUPER};

    #[test]
    fn rejects_modifiers_only_shortcuts() {
        let result = NativeListener::new(Shortcut::new(MODIFIERS_ONLY, MOD_SUPER));
        assert!(result.is_err());
    }

    #[test]
    fn accepts_ordinary_chord() {
        let result = NativeListener::new(Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT));
        assert!(result.is_ok());
    }

    #[test]
    fn modifiers_from_bits_maps_all_four() {
        let m = modifiers_from_bits(MOD_CONTROL | MOD_SHIFT | MOD_SUPER);
        assert!(m.contains(Modifiers::CONTROL));
        assert!(m.contains(Modifiers::SHIFT));
        assert!(m.contains(Modifiers::SUPER));
        assert!(!m.contains(Modifiers::ALT));
    }

    #[test]
    fn code_for_key_covers_letters_digits_and_space() {
        assert_eq!(code_for_key(b'a' as i32).unwrap(), Code::KeyA);
        assert_eq!(code_for_key(b'5' as i32).unwrap(), Code::Digit5);
        assert_eq!(code_for_key(b' ' as i32).unwrap(), Code::Space);
        assert!(code_for_key(b'!' as i32).is_err());
    }
}
