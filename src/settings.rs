//! Settings Store: the persistent record of User Settings from spec.md §3, written
//! atomically to a TOML file under the platform config directory. Generalizes the
//! teacher's `config.rs` — same `directories`-crate-rooted, serde-derived,
//! missing-keys-seeded-from-defaults shape — trimmed to the nine keys §3 actually
//! names (dropping the teacher's eager-processing, profiles, post-process-command,
//! and multi-model-cache settings, which belong to Non-goal features).

use crate::error::SettingsError;
use crate::shortcut::{Shortcut, MOD_CONTROL, MOD_SHIFT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyMode {
    #[default]
    PushToTalk,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub hotkey_mode: HotkeyMode,
    #[serde(default)]
    pub hotkey: Shortcut,
    #[serde(default = "default_true")]
    pub show_overlay: bool,
    #[serde(default = "default_true")]
    pub auto_paste: bool,
    #[serde(default = "default_true")]
    pub auto_select_model: bool,
    #[serde(default)]
    pub launch_at_login: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_model() -> String {
    "small-accelerated".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: default_language(),
            backend: Backend::default(),
            model: default_model(),
            hotkey_mode: HotkeyMode::default(),
            hotkey: Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT),
            show_overlay: true,
            auto_paste: true,
            auto_select_model: true,
            launch_at_login: false,
        }
    }
}

/// Owns the on-disk TOML file and broadcasts changes via a `watch` channel so the
/// controller can rebind the hotkey and the UI can refresh (spec.md §4.11).
pub struct SettingsStore {
    path: PathBuf,
    current: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Loads from `path`, seeding missing keys from [`Settings::default`]. Creates
    /// the file with defaults if it doesn't exist yet.
    pub fn load(path: PathBuf) -> Result<Self, SettingsError> {
        let settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| SettingsError::ReadFailed(e.to_string()))?;
            toml::from_str(&contents).map_err(|e| SettingsError::ParseFailed(e.to_string()))?
        } else {
            Settings::default()
        };

        let store = Self {
            path,
            current: watch::Sender::new(settings),
        };
        store.write_to_disk()?;
        Ok(store)
    }

    /// Default path: `ProjectDirs::config_dir()/settings.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dictation-core")
            .map(|dirs| dirs.config_dir().join("settings.toml"))
    }

    pub fn get(&self) -> Settings {
        self.current.borrow().clone()
    }

    /// Subscribes to change notifications; the returned receiver's `borrow()`
    /// always holds the latest settings snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.current.subscribe()
    }

    /// Applies `update` to a copy of the current settings, persists it atomically,
    /// and notifies subscribers only if the value actually changed.
    pub fn update(&self, update: impl FnOnce(&mut Settings)) -> Result<(), SettingsError> {
        let mut settings = self.get();
        update(&mut settings);
        if settings == self.get() {
            return Ok(());
        }
        self.write(settings)
    }

    pub fn reset_to_defaults(&self) -> Result<(), SettingsError> {
        self.write(Settings::default())
    }

    fn write(&self, settings: Settings) -> Result<(), SettingsError> {
        self.current.send_replace(settings);
        self.write_to_disk()
    }

    /// Writes the current settings to `self.path` via a temp-file-then-rename, the
    /// same durability pattern the teacher uses elsewhere via `tempfile`.
    fn write_to_disk(&self) -> Result<(), SettingsError> {
        let settings = self.current.borrow();
        let contents =
            toml::to_string_pretty(&*settings).map_err(|e| SettingsError::WriteFailed(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::WriteFailed(e.to_string()))?;
        }

        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, contents).map_err(|e| SettingsError::WriteFailed(e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| SettingsError::WriteFailed(e.to_string()))?;

        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let settings = Settings::default();
        assert_eq!(settings.language, "en");
        assert_eq!(settings.backend, Backend::Local);
        assert_eq!(settings.hotkey_mode, HotkeyMode::PushToTalk);
        assert_eq!(settings.hotkey, Shortcut::new(b' ' as i32, MOD_CONTROL | MOD_SHIFT));
        assert!(settings.show_overlay);
        assert!(settings.auto_paste);
        assert!(settings.auto_select_model);
        assert!(!settings.launch_at_login);
    }

    #[test]
    fn load_seeds_defaults_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::load(path.clone()).unwrap();
        assert_eq!(store.get(), Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn load_seeds_missing_keys_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "language = \"fr\"\n").unwrap();
        let store = SettingsStore::load(path).unwrap();
        assert_eq!(store.get().language, "fr");
        assert_eq!(store.get().backend, Backend::Local);
    }

    #[test]
    fn update_persists_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::load(path.clone()).unwrap();
        let mut rx = store.subscribe();

        store.update(|s| s.auto_paste = false).unwrap();
        assert!(!store.get().auto_paste);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        let reloaded = SettingsStore::load(path).unwrap();
        assert!(!reloaded.get().auto_paste);
    }

    #[test]
    fn update_with_no_actual_change_does_not_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::load(path).unwrap();
        let rx = store.subscribe();

        store.update(|s| s.auto_paste = true).unwrap(); // already true
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn reset_to_defaults_restores_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::load(path).unwrap();
        store.update(|s| s.language = "de".to_string()).unwrap();
        store.reset_to_defaults().unwrap();
        assert_eq!(store.get().language, "en");
    }
}
