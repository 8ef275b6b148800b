//! Canonical keyboard shortcut representation.
//!
//! Pure module: no OS calls, no crate dependencies. Generalizes the teacher's
//! macOS-only `VirtualKeyCode`/`CGEventFlags` mapping into a platform-neutral bitset
//! so the same `Shortcut` type is shared by both hotkey backends and both target OSes.

/// Sentinel key code meaning "modifiers only, no non-modifier key".
pub const MODIFIERS_ONLY: i32 = -1;

pub const MOD_CONTROL: u32 = 1 << 0;
pub const MOD_ALT: u32 = 1 << 1;
pub const MOD_SHIFT: u32 = 1 << 2;
pub const MOD_SUPER: u32 = 1 << 3;
/// Chosen to not collide with any OS modifier bit (spec.md §3).
pub const MOD_FN: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shortcut {
    pub key_code: i32,
    pub modifiers: u32,
}

impl Shortcut {
    pub const fn new(key_code: i32, modifiers: u32) -> Self {
        Self {
            key_code,
            modifiers,
        }
    }

    pub fn is_modifiers_only(&self) -> bool {
        self.key_code == MODIFIERS_ONLY
    }

    pub fn has_fn(&self) -> bool {
        self.modifiers & MOD_FN != 0
    }
}

impl Default for Shortcut {
    /// Ctrl+Shift+Space, the default per spec.md §3/§6.
    fn default() -> Self {
        Self::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT)
    }
}

/// Bidirectional mapping across the four common OS modifiers plus the custom Fn bit.
/// `flags` is an OS-native bitmask whose bit positions are irrelevant here — callers on
/// each platform translate their native flag type to/from this canonical `u32` at the
/// hotkey-backend boundary, so this function is the identity on the canonical bitset.
pub fn from_os_flags(flags: u32) -> u32 {
    flags & (MOD_CONTROL | MOD_ALT | MOD_SHIFT | MOD_SUPER | MOD_FN)
}

pub fn to_os_flags(bits: u32) -> u32 {
    bits & (MOD_CONTROL | MOD_ALT | MOD_SHIFT | MOD_SUPER | MOD_FN)
}

/// Recognizes OS key codes representing a modifier pressed in isolation.
///
/// Codes follow the macOS virtual-keycode space used by the event-tap backend
/// (`hotkey::macos`); the evdev backend maps its own keycodes into this same space
/// before calling in, so this check stays platform-neutral.
pub fn is_modifier_key(code: i32) -> bool {
    matches!(
        code,
        0x37 | 0x36 // Command L/R
        | 0x38 | 0x3C // Shift L/R
        | 0x3A | 0x3D // Option/Alt L/R
        | 0x3B | 0x3E // Control L/R
        | 0x3F // Fn
    )
}

/// True iff the shortcut must use the event-tap backend (spec.md §4.3/§4.4).
pub fn requires_event_tap(shortcut: &Shortcut) -> bool {
    shortcut.is_modifiers_only() || shortcut.has_fn()
}

fn key_name(code: i32) -> String {
    match code {
        MODIFIERS_ONLY => String::new(),
        c @ 32..=126 => (c as u8 as char).to_string().to_uppercase(),
        c => format!("Key{}", c),
    }
}

/// Human-readable rendering, e.g. "⌃⇧Space", "⌘", "Fn+Z".
///
/// Modifier order per spec.md §6: control, option/alt, shift, command/super.
pub fn render(shortcut: &Shortcut) -> String {
    let mut out = String::new();
    if shortcut.has_fn() {
        out.push_str("Fn+");
    }
    if shortcut.modifiers & MOD_CONTROL != 0 {
        out.push('\u{2303}');
    }
    if shortcut.modifiers & MOD_ALT != 0 {
        out.push('\u{2325}');
    }
    if shortcut.modifiers & MOD_SHIFT != 0 {
        out.push('\u{21E7}');
    }
    if shortcut.modifiers & MOD_SUPER != 0 {
        out.push('\u{2318}');
    }
    if shortcut.is_modifiers_only() {
        return out;
    }
    if shortcut.key_code == b' ' as i32 {
        out.push_str("Space");
    } else {
        out.push_str(&key_name(shortcut.key_code));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_event_tap_modifiers_only() {
        let s = Shortcut::new(MODIFIERS_ONLY, MOD_SUPER);
        assert!(requires_event_tap(&s));
    }

    #[test]
    fn requires_event_tap_fn_bit() {
        let s = Shortcut::new(b'z' as i32, MOD_FN);
        assert!(requires_event_tap(&s));
    }

    #[test]
    fn requires_event_tap_false_for_normal_chord() {
        let s = Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT);
        assert!(!requires_event_tap(&s));
    }

    #[test]
    fn os_flags_round_trip() {
        for bits in [
            MOD_CONTROL,
            MOD_ALT,
            MOD_SHIFT,
            MOD_SUPER,
            MOD_FN,
            MOD_CONTROL | MOD_SHIFT,
            MOD_CONTROL | MOD_ALT | MOD_SHIFT | MOD_SUPER | MOD_FN,
        ] {
            assert_eq!(to_os_flags(from_os_flags(bits)), bits);
        }
    }

    #[test]
    fn render_is_stable_and_distinguishes_distinct_shortcuts() {
        let a = Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT);
        let b = Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT);
        let c = Shortcut::new(MODIFIERS_ONLY, MOD_SUPER);
        assert_eq!(render(&a), render(&b));
        assert_ne!(render(&a), render(&c));
        assert_eq!(render(&a), "\u{2303}\u{21E7}Space");
    }

    #[test]
    fn render_modifiers_only_command() {
        let s = Shortcut::new(MODIFIERS_ONLY, MOD_SUPER);
        assert_eq!(render(&s), "\u{2318}");
    }

    #[test]
    fn render_fn_prefix() {
        let s = Shortcut::new(b'z' as i32, MOD_FN);
        assert_eq!(render(&s), "Fn+Z");
    }

    #[test]
    fn is_modifier_key_recognizes_known_codes() {
        assert!(is_modifier_key(0x37));
        assert!(is_modifier_key(0x3F));
        assert!(!is_modifier_key(b'a' as i32));
    }
}
