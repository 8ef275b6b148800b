//! App-session and dictation-session identifiers.
//!
//! Every log line carries both when defined (§3, §4.2). Session ids are derived from
//! the process id plus a process-local monotonic counter rather than pulling in a
//! randomness dependency solely for this.

use std::sync::atomic::{AtomicU32, Ordering};

static DICTATION_SESSION_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate the app-session id once at startup: `app-{8 hex chars}`.
pub fn new_app_session_id() -> String {
    format!("app-{:08x}", std::process::id())
}

/// Generate a fresh dictation-session id when the controller leaves `Idle`.
pub fn new_dictation_session_id() -> String {
    let n = DICTATION_SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    format!("dict-{:08x}", pid.wrapping_mul(2654435761).wrapping_add(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_session_id_is_stable_within_process() {
        assert_eq!(new_app_session_id(), new_app_session_id());
    }

    #[test]
    fn dictation_session_ids_are_unique() {
        let a = new_dictation_session_id();
        let b = new_dictation_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("dict-"));
    }
}
