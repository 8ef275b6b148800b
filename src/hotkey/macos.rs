//! macOS event-tap hotkey backend (CGEventTap), required for modifiers-only
//! shortcuts and the Fn key (spec.md §4.4). Adapted from the teacher's
//! `hotkey/macos.rs`: same `CGEventTap` + `CFRunLoop` shape, generalized from a
//! fixed `VirtualKeyCode`/`CGEventFlags` pair to the canonical `Shortcut` bitset, and
//! extended with the modifiers-only candidate/cancel state machine the teacher's
//! fixed Fn-only handling didn't need.

use super::{HotkeyEvent, HotkeyListener};
use crate::error::HotkeyError;
use crate::shortcut::{self, Shortcut};
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventType, EventField,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub struct MacEventTapListener {
    shortcut: Shortcut,
    stop_signal: Option<oneshot::Sender<()>>,
    stop_flag: Arc<AtomicBool>,
}

impl MacEventTapListener {
    pub fn new(shortcut: Shortcut) -> Result<Self, HotkeyError> {
        if !check_accessibility_permission() {
            return Err(HotkeyError::PermissionMissing(
                "Accessibility permission required: System Settings > Privacy & Security > \
                 Accessibility"
                    .into(),
            ));
        }
        Ok(Self {
            shortcut,
            stop_signal: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Re-arms a `CGEventTap` from inside its own callback after a
/// `TapDisabledByTimeout`/`TapDisabledByUserInput` event. The `core-graphics` crate's
/// safe `CGEventTap::enable()` is only reachable on the owning value, which the
/// callback closure doesn't hold; `CGEventTapProxy` is the pointer Apple's API hands
/// the callback specifically so it can call `CGEventTapEnable` itself.
unsafe fn reenable_tap(proxy: core_graphics::event::CGEventTapProxy) {
    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGEventTapEnable(tap: core_graphics::event::CGEventTapProxy, enable: bool);
    }
    CGEventTapEnable(proxy, true);
}

fn check_accessibility_permission() -> bool {
    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
    }
    unsafe { AXIsProcessTrusted() }
}

#[async_trait::async_trait]
impl HotkeyListener for MacEventTapListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);
        self.stop_flag.store(false, Ordering::SeqCst);

        let shortcut = self.shortcut;
        let stop_flag = Arc::clone(&self.stop_flag);

        tokio::task::spawn_blocking(move || {
            if let Err(e) = event_tap_loop(shortcut, tx, stop_rx, stop_flag) {
                tracing::error!("macOS hotkey event tap error: {e}");
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(())
    }
}

fn cg_modifiers_from_bits(bits: u32) -> CGEventFlags {
    let mut flags = CGEventFlags::empty();
    if bits & shortcut::MOD_CONTROL != 0 {
        flags |= CGEventFlags::CGEventFlagControl;
    }
    if bits & shortcut::MOD_ALT != 0 {
        flags |= CGEventFlags::CGEventFlagAlternate;
    }
    if bits & shortcut::MOD_SHIFT != 0 {
        flags |= CGEventFlags::CGEventFlagShift;
    }
    if bits & shortcut::MOD_SUPER != 0 {
        flags |= CGEventFlags::CGEventFlagCommand;
    }
    flags
}

fn event_tap_loop(
    shortcut: Shortcut,
    tx: mpsc::Sender<HotkeyEvent>,
    _stop_rx: oneshot::Receiver<()>,
    stop_flag: Arc<AtomicBool>,
) -> Result<(), HotkeyError> {
    let is_pressed = Arc::new(AtomicBool::new(false));
    let canceled = Arc::new(AtomicBool::new(false));
    let (event_tx, event_rx) = std_mpsc::channel::<HotkeyEvent>();

    let is_pressed_cb = Arc::clone(&is_pressed);
    let canceled_cb = Arc::clone(&canceled);
    let stop_flag_cb = Arc::clone(&stop_flag);
    let required_flags = cg_modifiers_from_bits(shortcut.modifiers);
    let modifiers_only = shortcut.is_modifiers_only();
    let has_fn = shortcut.has_fn();

    let callback = move |proxy: core_graphics::event::CGEventTapProxy,
                          event_type: CGEventType,
                          event: &CGEvent|
          -> Option<CGEvent> {
        if stop_flag_cb.load(Ordering::SeqCst) {
            CFRunLoop::get_current().stop();
            return Some(event.clone());
        }

        let key_code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as i32;
        let flags = event.get_flags();

        match event_type {
            CGEventType::KeyDown => {
                if modifiers_only {
                    // Any non-modifier key while the chord is held cancels the
                    // activation rather than letting it ride through to release.
                    if is_pressed_cb.load(Ordering::SeqCst) && !shortcut::is_modifier_key(key_code)
                    {
                        canceled_cb.store(true, Ordering::SeqCst);
                        let _ = event_tx.send(HotkeyEvent::ModifierOnlyCanceled);
                    }
                } else if key_code == shortcut.key_code
                    && !has_fn
                    && flags.contains(required_flags)
                    && !is_pressed_cb.load(Ordering::SeqCst)
                {
                    is_pressed_cb.store(true, Ordering::SeqCst);
                    let _ = event_tx.send(HotkeyEvent::Pressed);
                }
            }
            CGEventType::KeyUp => {
                if !modifiers_only
                    && !has_fn
                    && key_code == shortcut.key_code
                    && is_pressed_cb.load(Ordering::SeqCst)
                {
                    is_pressed_cb.store(false, Ordering::SeqCst);
                    let _ = event_tx.send(HotkeyEvent::Released);
                }
            }
            CGEventType::FlagsChanged => {
                if has_fn {
                    let fn_down = flags.contains(CGEventFlags::CGEventFlagSecondaryFn);
                    transition_modifier_hold(
                        fn_down,
                        &is_pressed_cb,
                        &canceled_cb,
                        &event_tx,
                    );
                } else if modifiers_only {
                    let chord_down = !required_flags.is_empty() && flags.contains(required_flags);
                    transition_modifier_hold(
                        chord_down,
                        &is_pressed_cb,
                        &canceled_cb,
                        &event_tx,
                    );
                }
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                tracing::warn!("macOS event tap disabled ({:?}), re-enabling", event_type);
                // The tap proxy handed to this callback is exactly what
                // CGEventTapEnable expects to re-arm the tap without dropping
                // subsequent events (spec.md: "MUST ... re-enable the tap").
                unsafe { reenable_tap(proxy) };
            }
            _ => {}
        }

        Some(event.clone())
    };

    let event_tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    )
    .map_err(|_| {
        HotkeyError::PermissionMissing(
            "failed to create event tap; Accessibility permission may have been revoked".into(),
        )
    })?;

    event_tap.enable();

    let run_loop_source = event_tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HotkeyError::BackendUnavailable("failed to create run loop source".into()))?;

    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&run_loop_source, unsafe { kCFRunLoopCommonModes });

    let tx_clone = tx.clone();
    let stop_flag_thread = Arc::clone(&stop_flag);
    std::thread::spawn(move || loop {
        if stop_flag_thread.load(Ordering::SeqCst) {
            break;
        }
        match event_rx.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(event) => {
                if tx_clone.blocking_send(event).is_err() {
                    break;
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        }
    });

    while !stop_flag.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopDefaultMode },
            std::time::Duration::from_millis(100),
            true,
        );
    }

    Ok(())
}

/// Shared FlagsChanged transition logic for both the Fn key and a modifiers-only
/// chord: emits `Pressed` on the rising edge, `Released` on the falling edge unless
/// the hold was already canceled, in which case it just resets state silently.
fn transition_modifier_hold(
    down: bool,
    is_pressed: &Arc<AtomicBool>,
    canceled: &Arc<AtomicBool>,
    event_tx: &std_mpsc::Sender<HotkeyEvent>,
) {
    if down && !is_pressed.load(Ordering::SeqCst) {
        is_pressed.store(true, Ordering::SeqCst);
        canceled.store(false, Ordering::SeqCst);
        let _ = event_tx.send(HotkeyEvent::Pressed);
    } else if !down && is_pressed.load(Ordering::SeqCst) {
        is_pressed.store(false, Ordering::SeqCst);
        if !canceled.swap(false, Ordering::SeqCst) {
            let _ = event_tx.send(HotkeyEvent::Released);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut::{MOD_ALT, MOD_CONTROL, MOD_SHIFT, MOD_SUPER};

    #[test]
    fn cg_modifiers_from_bits_maps_all_four() {
        let flags = cg_modifiers_from_bits(MOD_CONTROL | MOD_ALT | MOD_SHIFT | MOD_SUPER);
        assert!(flags.contains(CGEventFlags::CGEventFlagControl));
        assert!(flags.contains(CGEventFlags::CGEventFlagAlternate));
        assert!(flags.contains(CGEventFlags::CGEventFlagShift));
        assert!(flags.contains(CGEventFlags::CGEventFlagCommand));
    }

    #[test]
    fn cg_modifiers_from_bits_empty_for_zero() {
        assert_eq!(cg_modifiers_from_bits(0), CGEventFlags::empty());
    }
}
