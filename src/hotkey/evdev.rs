//! Linux event-tap hotkey backend (evdev), required for modifiers-only shortcuts
//! (spec.md §4.4). Adapted from the teacher's `hotkey/evdev_listener.rs`: same
//! device-discovery and non-blocking poll loop, generalized from a fixed target
//! key + modifier set to the canonical `Shortcut` bitset and extended with the
//! modifiers-only candidate/cancel state machine mirrored from the macOS backend.
//! Requires the running user to be in the `input` group.

use super::{HotkeyEvent, HotkeyListener};
use crate::error::HotkeyError;
use crate::shortcut::{self, Shortcut};
use evdev::{Device, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

pub struct EvdevListener {
    shortcut: Shortcut,
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevListener {
    pub fn new(shortcut: Shortcut) -> Result<Self, HotkeyError> {
        if find_keyboard_devices()?.is_empty() {
            return Err(HotkeyError::BackendUnavailable(
                "no readable keyboard device found under /dev/input; is this user in the \
                 'input' group?"
                    .into(),
            ));
        }
        Ok(Self {
            shortcut,
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl HotkeyListener for EvdevListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let shortcut = self.shortcut;
        let device_paths = find_keyboard_devices()?;

        tokio::task::spawn_blocking(move || {
            evdev_loop(device_paths, shortcut, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

fn evdev_loop(
    device_paths: Vec<PathBuf>,
    shortcut: Shortcut,
    tx: mpsc::Sender<HotkeyEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut devices: Vec<Device> = device_paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                Some(device)
            }
            Err(e) => {
                tracing::warn!("failed to open {path:?}: {e}");
                None
            }
        })
        .collect();

    if devices.is_empty() {
        tracing::error!("no keyboard devices could be opened");
        return;
    }

    let mut active_modifiers: u32 = 0;
    let mut is_pressed = false;
    let mut canceled = false;

    loop {
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => return,
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        for device in &mut devices {
            let Ok(events) = device.fetch_events() else {
                continue;
            };
            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                let value = event.value();

                if let Some(mac_code) = key_to_modifier_space(key) {
                    let bit = modifier_bit_for(mac_code);
                    match value {
                        1 => active_modifiers |= bit,
                        0 => active_modifiers &= !bit,
                        _ => {}
                    }
                }

                if shortcut.is_modifiers_only() {
                    let required = shortcut::to_os_flags(shortcut.modifiers);
                    let down = required != 0 && active_modifiers & required == required;
                    if down && !is_pressed {
                        is_pressed = true;
                        canceled = false;
                        if tx.blocking_send(HotkeyEvent::Pressed).is_err() {
                            return;
                        }
                    } else if !down && is_pressed {
                        is_pressed = false;
                        if canceled {
                            canceled = false;
                        } else if tx.blocking_send(HotkeyEvent::Released).is_err() {
                            return;
                        }
                    } else if is_pressed && key_to_modifier_space(key).is_none() && value == 1 {
                        canceled = true;
                        if tx.blocking_send(HotkeyEvent::ModifierOnlyCanceled).is_err() {
                            return;
                        }
                    }
                } else if let Some(ascii) = key_to_ascii(key) {
                    if ascii == shortcut.key_code {
                        let required = shortcut::to_os_flags(shortcut.modifiers);
                        let satisfied = active_modifiers & required == required;
                        match value {
                            1 if satisfied && !is_pressed => {
                                is_pressed = true;
                                if tx.blocking_send(HotkeyEvent::Pressed).is_err() {
                                    return;
                                }
                            }
                            0 if is_pressed => {
                                is_pressed = false;
                                if tx.blocking_send(HotkeyEvent::Released).is_err() {
                                    return;
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

fn modifier_bit_for(mac_code: i32) -> u32 {
    match mac_code {
        0x37 | 0x36 => shortcut::MOD_SUPER,
        0x38 | 0x3C => shortcut::MOD_SHIFT,
        0x3A | 0x3D => shortcut::MOD_ALT,
        0x3B | 0x3E => shortcut::MOD_CONTROL,
        0x3F => shortcut::MOD_FN,
        _ => 0,
    }
}

/// Maps an evdev modifier key to the macOS virtual-keycode space `Shortcut`/
/// `shortcut::is_modifier_key` use as their canonical modifier identity.
fn key_to_modifier_space(key: Key) -> Option<i32> {
    match key {
        Key::KEY_LEFTMETA => Some(0x37),
        Key::KEY_RIGHTMETA => Some(0x36),
        Key::KEY_LEFTSHIFT => Some(0x38),
        Key::KEY_RIGHTSHIFT => Some(0x3C),
        Key::KEY_LEFTALT => Some(0x3A),
        Key::KEY_RIGHTALT => Some(0x3D),
        Key::KEY_LEFTCTRL => Some(0x3B),
        Key::KEY_RIGHTCTRL => Some(0x3E),
        _ => None,
    }
}

/// Maps an evdev key to the printable-ASCII keycode space `Shortcut::key_code` uses
/// for non-modifier keys.
fn key_to_ascii(key: Key) -> Option<i32> {
    let c = match key {
        Key::KEY_SPACE => ' ',
        Key::KEY_A => 'a',
        Key::KEY_B => 'b',
        Key::KEY_C => 'c',
        Key::KEY_D => 'd',
        Key::KEY_E => 'e',
        Key::KEY_F => 'f',
        Key::KEY_G => 'g',
        Key::KEY_H => 'h',
        Key::KEY_I => 'i',
        Key::KEY_J => 'j',
        Key::KEY_K => 'k',
        Key::KEY_L => 'l',
        Key::KEY_M => 'm',
        Key::KEY_N => 'n',
        Key::KEY_O => 'o',
        Key::KEY_P => 'p',
        Key::KEY_Q => 'q',
        Key::KEY_R => 'r',
        Key::KEY_S => 's',
        Key::KEY_T => 't',
        Key::KEY_U => 'u',
        Key::KEY_V => 'v',
        Key::KEY_W => 'w',
        Key::KEY_X => 'x',
        Key::KEY_Y => 'y',
        Key::KEY_Z => 'z',
        Key::KEY_0 => '0',
        Key::KEY_1 => '1',
        Key::KEY_2 => '2',
        Key::KEY_3 => '3',
        Key::KEY_4 => '4',
        Key::KEY_5 => '5',
        Key::KEY_6 => '6',
        Key::KEY_7 => '7',
        Key::KEY_8 => '8',
        Key::KEY_9 => '9',
        _ => return None,
    };
    Some(c as i32)
}

fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();
    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::BackendUnavailable(format!("/dev/input: {e}")))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::BackendUnavailable(e.to_string()))?;
        let path = entry.path();
        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);
        if !is_event_device {
            continue;
        }

        if let Ok(device) = Device::open(&path) {
            let has_keys = device
                .supported_keys()
                .map(|keys| {
                    keys.contains(Key::KEY_A) && keys.contains(Key::KEY_Z) && keys.contains(Key::KEY_ENTER)
                })
                .unwrap_or(false);
            if has_keys {
                keyboards.push(path);
            }
        }
    }

    Ok(keyboards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_to_ascii_maps_letters_and_space() {
        assert_eq!(key_to_ascii(Key::KEY_A), Some('a' as i32));
        assert_eq!(key_to_ascii(Key::KEY_SPACE), Some(' ' as i32));
        assert_eq!(key_to_ascii(Key::KEY_ENTER), None);
    }

    #[test]
    fn key_to_modifier_space_matches_shortcut_is_modifier_key() {
        for key in [
            Key::KEY_LEFTMETA,
            Key::KEY_RIGHTMETA,
            Key::KEY_LEFTSHIFT,
            Key::KEY_RIGHTSHIFT,
            Key::KEY_LEFTALT,
            Key::KEY_RIGHTALT,
            Key::KEY_LEFTCTRL,
            Key::KEY_RIGHTCTRL,
        ] {
            let mac_code = key_to_modifier_space(key).unwrap();
            assert!(shortcut::is_modifier_key(mac_code));
        }
    }

    #[test]
    fn modifier_bit_for_covers_all_four_recognized_groups() {
        assert_eq!(modifier_bit_for(0x37), shortcut::MOD_SUPER);
        assert_eq!(modifier_bit_for(0x38), shortcut::MOD_SHIFT);
        assert_eq!(modifier_bit_for(0x3A), shortcut::MOD_ALT);
        assert_eq!(modifier_bit_for(0x3B), shortcut::MOD_CONTROL);
        assert_eq!(modifier_bit_for(0x3F), shortcut::MOD_FN);
    }
}
