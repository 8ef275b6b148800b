//! Buffered, rotated, line-delimited JSON structured log with session correlation.
//!
//! A dedicated sink for dictation lifecycle events — distinct from the ordinary
//! `tracing::{debug,info,warn,error}!` calls sprinkled through the rest of the crate
//! for implementation-detail logging (installed once in `app::run` via
//! `tracing_subscriber`, the teacher's own logging stack). This component owns its own
//! JSON-lines writer so the §4.2 contract (exact field shape, redaction, rotation) is
//! independently testable rather than riding on `tracing_subscriber`'s generic JSON
//! formatter, whose field set is driven by whatever the call site passes.

use crate::error::LogError;
use chrono::Utc;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

const MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_GENERATIONS: u8 = 5;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const FLUSH_QUEUE_LEN: usize = 50;
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// A single structured log line, queued for the writer task.
struct Entry {
    level: Level,
    category: String,
    event: String,
    fields: Map<String, Value>,
    app_session: String,
    dictation_session: Option<String>,
}

/// Size-based rotating writer: at `MAX_FILE_BYTES`, the active file is renamed to
/// `.1.log`, older numbered backups shift up, and generations beyond
/// `MAX_GENERATIONS` are deleted (spec.md §4.2/§6).
struct RotatingWriter {
    dir: PathBuf,
    base_name: String,
    file: File,
    size: u64,
}

impl RotatingWriter {
    fn open(dir: &Path, base_name: &str) -> Result<Self, LogError> {
        fs::create_dir_all(dir).map_err(|e| LogError::DirCreateFailed(e.to_string()))?;
        set_owner_only_dir(dir);
        let path = dir.join(format!("{base_name}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogError::OpenFailed(e.to_string()))?;
        set_owner_only_file(&path);
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            dir: dir.to_path_buf(),
            base_name: base_name.to_string(),
            file,
            size,
        })
    }

    fn path_for(&self, generation: u8) -> PathBuf {
        if generation == 0 {
            self.dir.join(format!("{}.log", self.base_name))
        } else {
            self.dir
                .join(format!("{}.{}.log", self.base_name, generation))
        }
    }

    fn rotate(&mut self) -> Result<(), LogError> {
        let oldest = self.path_for(MAX_GENERATIONS);
        let _ = fs::remove_file(&oldest);
        for gen in (1..MAX_GENERATIONS).rev() {
            let from = self.path_for(gen);
            let to = self.path_for(gen + 1);
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }
        let active = self.path_for(0);
        let backup = self.path_for(1);
        let _ = fs::rename(&active, &backup);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active)
            .map_err(|e| LogError::OpenFailed(e.to_string()))?;
        set_owner_only_file(&active);
        self.file = file;
        self.size = 0;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), LogError> {
        let bytes = line.len() as u64 + 1;
        if self.size + bytes > MAX_FILE_BYTES && self.size > 0 {
            self.rotate()?;
        }
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.write_all(b"\n"))
            .map_err(|e| LogError::OpenFailed(e.to_string()))?;
        self.size += bytes;
        Ok(())
    }

    fn flush(&mut self) {
        let _ = self.file.flush();
    }
}

#[cfg(unix)]
fn set_owner_only_dir(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(dir) {
        let mut perms = meta.permissions();
        perms.set_mode(0o700);
        let _ = fs::set_permissions(dir, perms);
    }
}

#[cfg(not(unix))]
fn set_owner_only_dir(_dir: &Path) {}

#[cfg(unix)]
fn set_owner_only_file(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mut perms = meta.permissions();
        perms.set_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_owner_only_file(_path: &Path) {}

/// Redacts fields that must never reach the log: transcript text and credential
/// secrets. Remote HTTP error bodies are reduced to an opaque kind + status code by
/// the caller before they ever reach `fields` — this is a second line of defense.
fn redact(fields: &mut Map<String, Value>) {
    for key in ["transcript", "text", "secret", "api_key", "password"] {
        fields.remove(key);
    }
}

/// Handle to the event log. Cheap to clone; the writer task owns the actual file.
#[derive(Clone)]
pub struct EventLog {
    tx: mpsc::Sender<Entry>,
    app_session: String,
    dictation_session: Mutex<Option<String>>,
}

impl EventLog {
    /// Spawns the writer task and returns a handle. `dir` is the OS-standard log
    /// directory for the application (`<LogsDir>/<AppName>`, spec.md §6);
    /// `base_name` is the app name used for `<app-name>.log`.
    pub fn start(dir: PathBuf, base_name: String, app_session: String) -> Result<Self, LogError> {
        let writer = RotatingWriter::open(&dir, &base_name)?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_writer(writer, rx));
        Ok(Self {
            tx,
            app_session,
            dictation_session: Mutex::new(None),
        })
    }

    pub fn begin_dictation_session(&self) -> String {
        let id = crate::session::new_dictation_session_id();
        *self.dictation_session.lock().unwrap() = Some(id.clone());
        id
    }

    pub fn end_dictation_session(&self) {
        *self.dictation_session.lock().unwrap() = None;
    }

    fn current_dictation_session(&self) -> Option<String> {
        self.dictation_session.lock().unwrap().clone()
    }

    fn emit(&self, level: Level, category: &str, event: &str, fields: Map<String, Value>) {
        let entry = Entry {
            level,
            category: category.to_string(),
            event: event.to_string(),
            fields,
            app_session: self.app_session.clone(),
            dictation_session: self.current_dictation_session(),
        };
        // A full queue means the writer task has fallen behind; dropping here (rather
        // than blocking the caller, which may be on the controller's hot path) is
        // preferable to stalling dictation over a logging backlog.
        let _ = self.tx.try_send(entry);
    }

    pub fn debug(&self, category: &str, event: &str, fields: Map<String, Value>) {
        self.emit(Level::Debug, category, event, fields);
    }
    pub fn info(&self, category: &str, event: &str, fields: Map<String, Value>) {
        self.emit(Level::Info, category, event, fields);
    }
    pub fn warn(&self, category: &str, event: &str, fields: Map<String, Value>) {
        self.emit(Level::Warn, category, event, fields);
    }
    pub fn error(&self, category: &str, event: &str, fields: Map<String, Value>) {
        self.emit(Level::Error, category, event, fields);
    }

    pub fn app_session(&self) -> &str {
        &self.app_session
    }
}

async fn run_writer(mut writer: RotatingWriter, mut rx: mpsc::Receiver<Entry>) {
    let mut ticker = interval(FLUSH_INTERVAL);
    let mut pending = 0usize;
    loop {
        tokio::select! {
            maybe_entry = rx.recv() => {
                match maybe_entry {
                    Some(entry) => {
                        let line = serialize_line(&entry);
                        if writer.write_line(&line).is_ok() {
                            pending += 1;
                        }
                        if pending >= FLUSH_QUEUE_LEN {
                            writer.flush();
                            pending = 0;
                        }
                    }
                    None => {
                        writer.flush();
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if pending > 0 {
                    writer.flush();
                    pending = 0;
                }
            }
        }
    }
}

fn serialize_line(entry: &Entry) -> String {
    let mut fields = entry.fields.clone();
    redact(&mut fields);

    let mut obj = Map::new();
    obj.insert(
        "ts".to_string(),
        Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
    );
    obj.insert(
        "level".to_string(),
        Value::String(entry.level.as_str().to_string()),
    );
    obj.insert(
        "app_session".to_string(),
        Value::String(entry.app_session.clone()),
    );
    if let Some(ds) = &entry.dictation_session {
        obj.insert("dictation_session".to_string(), Value::String(ds.clone()));
    }
    obj.insert(
        "category".to_string(),
        Value::String(entry.category.clone()),
    );
    obj.insert("event".to_string(), Value::String(entry.event.clone()));
    for (k, v) in fields {
        obj.insert(k, v);
    }
    Value::Object(obj).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn redaction_strips_transcript_and_secret_fields() {
        let mut f = fields(&[
            ("transcript", json!("hello world")),
            ("samples", json!(24000)),
            ("api_key", json!("sk-secret")),
        ]);
        redact(&mut f);
        assert!(!f.contains_key("transcript"));
        assert!(!f.contains_key("api_key"));
        assert_eq!(f.get("samples"), Some(&json!(24000)));
    }

    #[test]
    fn serialized_line_never_contains_redacted_values() {
        let entry = Entry {
            level: Level::Error,
            category: "Transcription".to_string(),
            event: "failed".to_string(),
            fields: fields(&[
                ("transcript", json!("the secret transcript text")),
                ("error", json!("network timeout")),
            ]),
            app_session: "app-12345678".to_string(),
            dictation_session: Some("dict-deadbeef".to_string()),
        };
        let line = serialize_line(&entry);
        assert!(!line.contains("the secret transcript text"));
        assert!(line.contains("\"category\":\"Transcription\""));
        assert!(line.contains("\"dictation_session\":\"dict-deadbeef\""));
        assert!(serde_json::from_str::<Value>(&line).is_ok());
    }

    #[tokio::test]
    async fn rotation_keeps_at_most_five_generations() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RotatingWriter::open(dir.path(), "test").unwrap();
        // Force many rotations by writing lines larger than the cap threshold check.
        let big_line = "x".repeat(1024);
        for _ in 0..(MAX_FILE_BYTES / 1024 + 10) * 2 {
            writer.write_line(&big_line).unwrap();
        }
        writer.flush();
        let mut count = 0;
        for gen in 0..=MAX_GENERATIONS + 2 {
            if writer.path_for(gen).exists() {
                count += 1;
            }
        }
        assert!(count <= (MAX_GENERATIONS as usize + 1));
    }

    #[tokio::test]
    async fn writer_flushes_on_queue_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::start(
            dir.path().to_path_buf(),
            "test".to_string(),
            "app-12345678".to_string(),
        )
        .unwrap();
        for i in 0..FLUSH_QUEUE_LEN + 1 {
            log.info("Test", "tick", fields(&[("i", json!(i))]));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let content = fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert!(content.lines().count() >= FLUSH_QUEUE_LEN);
    }
}
