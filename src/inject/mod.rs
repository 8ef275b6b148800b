//! Text Injector: clipboard-save, write, synthesize-paste, clipboard-restore
//! (spec.md §4.10). Grounded on the teacher's `output/cgevent.rs` (key-event
//! synthesis shape) and `output/paste.rs` (clipboard-then-paste-keystroke sequencing),
//! generalized from full-text typing/ydotool shell-outs down to a single save/paste/
//! restore cycle around one Cmd+V (or Ctrl+V) pair.

pub mod linux;
pub mod macos;

use crate::error::InjectError;
use arboard::{Clipboard, ImageData};
use async_trait::async_trait;
use std::borrow::Cow;
use std::time::Duration;

/// Delay between posting the paste keystroke and restoring the clipboard — long
/// enough for the focused application to have read the pasteboard (spec.md §4.10
/// step 6).
const RESTORE_DELAY: Duration = Duration::from_millis(100);

/// Platform hook for step 4 (permission check) and step 5 (keystroke synthesis).
/// Everything else — clipboard save/write/restore — is platform-independent via
/// `arboard` and lives in this module.
#[async_trait]
pub trait PasteSynthesizer: Send + Sync {
    /// Checks whether the process holds the OS's simulated-input permission
    /// (Accessibility on macOS, `/dev/uinput` access on Linux). Does not prompt;
    /// the caller surfaces `PermissionDenied` and the platform's own permission
    /// flow takes it from there.
    fn check_permission(&self) -> bool;

    /// Posts a single paste (modifier+V) key-down/key-up pair to the global HID
    /// event stream.
    async fn synthesize_paste(&self) -> Result<(), InjectError>;
}

/// Owned snapshot of the clipboard's text and image representations, captured
/// before the dictation text is written so they can be restored afterward
/// (spec.md §4.10 step 2 — "every available representation, not just string").
struct ClipboardSnapshot {
    text: Option<String>,
    image: Option<(usize, usize, Vec<u8>)>,
}

impl ClipboardSnapshot {
    fn capture(clipboard: &mut Clipboard) -> Self {
        Self {
            text: clipboard.get_text().ok(),
            image: clipboard
                .get_image()
                .ok()
                .map(|img| (img.width, img.height, img.bytes.into_owned())),
        }
    }

    fn restore(&self, clipboard: &mut Clipboard) {
        if let Some((width, height, bytes)) = &self.image {
            let _ = clipboard.set_image(ImageData {
                width: *width,
                height: *height,
                bytes: Cow::Borrowed(bytes),
            });
            return;
        }
        if let Some(text) = &self.text {
            let _ = clipboard.set_text(text.clone());
        } else {
            let _ = clipboard.clear();
        }
    }
}

pub struct TextInjector {
    synthesizer: Box<dyn PasteSynthesizer>,
}

impl TextInjector {
    pub fn new(synthesizer: Box<dyn PasteSynthesizer>) -> Self {
        Self { synthesizer }
    }

    /// Builds the platform-default injector: [`macos::CGEventPasteSynthesizer`] on
    /// macOS, [`linux::UinputPasteSynthesizer`] elsewhere.
    #[cfg(target_os = "macos")]
    pub fn platform_default() -> Result<Self, InjectError> {
        Ok(Self::new(Box::new(macos::CGEventPasteSynthesizer::new())))
    }

    #[cfg(target_os = "linux")]
    pub fn platform_default() -> Result<Self, InjectError> {
        Ok(Self::new(Box::new(linux::UinputPasteSynthesizer::new()?)))
    }

    /// Implements spec.md §4.10's seven-step paste algorithm. The clipboard is
    /// restored on every exit path except the success path, where restoration is
    /// deferred ~100ms so the target application has time to read the pasteboard.
    pub async fn paste(&self, text: &str) -> Result<(), InjectError> {
        if text.is_empty() {
            return Ok(());
        }

        let mut clipboard =
            Clipboard::new().map_err(|e| InjectError::ClipboardFailed(e.to_string()))?;
        let saved = ClipboardSnapshot::capture(&mut clipboard);

        if let Err(e) = clipboard.set_text(text.to_string()) {
            saved.restore(&mut clipboard);
            return Err(InjectError::ClipboardFailed(e.to_string()));
        }

        if !self.synthesizer.check_permission() {
            saved.restore(&mut clipboard);
            return Err(InjectError::PermissionDenied);
        }

        if let Err(e) = self.synthesizer.synthesize_paste().await {
            saved.restore(&mut clipboard);
            return Err(e);
        }

        tokio::spawn(async move {
            tokio::time::sleep(RESTORE_DELAY).await;
            if let Ok(mut clipboard) = Clipboard::new() {
                saved.restore(&mut clipboard);
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSynthesizer {
        has_permission: AtomicBool,
        synthesize_calls: AtomicUsize,
        fail_synthesis: bool,
    }

    #[async_trait]
    impl PasteSynthesizer for FakeSynthesizer {
        fn check_permission(&self) -> bool {
            self.has_permission.load(Ordering::SeqCst)
        }

        async fn synthesize_paste(&self) -> Result<(), InjectError> {
            self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_synthesis {
                Err(InjectError::SynthesisFailed("forced failure".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn empty_text_is_silently_rejected_without_touching_clipboard() {
        let synth = Arc::new(FakeSynthesizer {
            has_permission: AtomicBool::new(true),
            synthesize_calls: AtomicUsize::new(0),
            fail_synthesis: false,
        });
        let injector = TextInjector::new(Box::new(FakeSynthesizer {
            has_permission: AtomicBool::new(true),
            synthesize_calls: AtomicUsize::new(0),
            fail_synthesis: false,
        }));
        let result = injector.paste("").await;
        assert!(result.is_ok());
        assert_eq!(synth.synthesize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_permission_surfaces_permission_denied() {
        let injector = TextInjector::new(Box::new(FakeSynthesizer {
            has_permission: AtomicBool::new(false),
            synthesize_calls: AtomicUsize::new(0),
            fail_synthesis: false,
        }));
        let result = injector.paste("hello").await;
        assert!(matches!(result, Err(InjectError::PermissionDenied)));
    }

    #[tokio::test]
    async fn synthesis_failure_propagates_as_synthesis_failed() {
        let injector = TextInjector::new(Box::new(FakeSynthesizer {
            has_permission: AtomicBool::new(true),
            synthesize_calls: AtomicUsize::new(0),
            fail_synthesis: true,
        }));
        let result = injector.paste("hello").await;
        assert!(matches!(result, Err(InjectError::SynthesisFailed(_))));
    }
}
