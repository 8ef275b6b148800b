//! App Shell: boots every subsystem and runs the top-level event loop.
//!
//! Grounded on the teacher's `main.rs` (tracing-subscriber setup) and
//! `daemon.rs::run()` (construction order, the `tokio::select!` shape, and
//! signal-triggered graceful shutdown). The menu-bar/CLI-subcommand/PID-lock surfaces
//! those functions also own are out of scope here — a single always-running
//! `tokio::main` process is all spec.md §1/§6 calls for.

use crate::controller::Controller;
use crate::credentials::CredentialStore;
use crate::hotkey::HotkeyEngine;
use crate::inject::TextInjector;
use crate::log::EventLog;
use crate::session;
use crate::settings::SettingsStore;
use crate::transcribe::router::TranscriptionRouter;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

/// How long to let the event log's 1s flush ticker run once more before exit, so the
/// shutdown log line itself isn't lost (spec.md §4.2 durability expectations).
const SHUTDOWN_FLUSH_GRACE: std::time::Duration = std::time::Duration::from_millis(1200);

/// Boots the runtime and runs until SIGTERM/SIGINT. Returns only on shutdown or an
/// unrecoverable boot failure.
pub async fn run() -> anyhow::Result<()> {
    let project_dirs = directories::ProjectDirs::from("", "", "dictation-core")
        .ok_or_else(|| anyhow::anyhow!("could not determine platform directories"))?;

    // The ordinary `tracing::{debug,info,warn,error}!` call sites sprinkled through the
    // rest of the crate are implementation-detail logging, distinct from the dedicated
    // JSON-lines Event Log below (spec.md §4.2). They go to a daily-rotated file here via
    // the teacher's own `tracing-appender` non-blocking writer, the same crate the
    // teacher depends on for this but never wires up in its own `main.rs`.
    let file_appender =
        tracing_appender::rolling::daily(project_dirs.data_local_dir().join("logs"), "trace.log");
    let (non_blocking, _trace_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dictation_core=info,warn")),
        )
        .with_target(false)
        .with_writer(non_blocking)
        .init();

    let app_session = session::new_app_session_id();
    tracing::info!(app_session = %app_session, "starting dictation-core");

    let log = EventLog::start(
        project_dirs.data_local_dir().join("logs"),
        "dictation-core".to_string(),
        app_session.clone(),
    )?;

    let settings_path = SettingsStore::default_path()
        .ok_or_else(|| anyhow::anyhow!("could not determine settings path"))?;
    let settings = Arc::new(SettingsStore::load(settings_path)?);

    let credentials = CredentialStore::new();
    let router = Arc::new(TranscriptionRouter::new());
    let injector = TextInjector::platform_default()
        .map_err(|e| tracing::warn!("text injection unavailable: {e}"))
        .ok();
    let audio = Box::new(crate::audio::CpalCapture::new(None));
    let models_dir = project_dirs.data_dir().join("models");

    let mut controller = Controller::new(
        settings.clone(),
        audio,
        router,
        injector,
        credentials,
        log.clone(),
        models_dir,
    );

    let initial_shortcut = settings.get().hotkey;
    let mut hotkey_engine = HotkeyEngine::new(initial_shortcut);
    let mut hotkey_rx = hotkey_engine.register().await?;

    let mut settings_rx = settings.subscribe();
    let mut bound_shortcut = initial_shortcut;

    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            event = hotkey_rx.recv() => {
                match event {
                    Some(event) => controller.handle_event(event).await,
                    // The active backend died unexpectedly; nothing left to listen for.
                    None => {
                        tracing::error!("hotkey listener channel closed unexpectedly");
                        break;
                    }
                }
            }

            changed = settings_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = settings_rx.borrow_and_update().hotkey;
                if current != bound_shortcut {
                    tracing::info!("hotkey setting changed, rebinding");
                    match hotkey_engine.rebind(current).await {
                        Ok(rx) => {
                            hotkey_rx = rx;
                            bound_shortcut = current;
                        }
                        Err(e) => {
                            log.error(
                                "Hotkey",
                                "rebind_failed",
                                [("error".to_string(), serde_json::json!(e.to_string()))]
                                    .into_iter()
                                    .collect(),
                            );
                        }
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }

            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
        }
    }

    let _ = hotkey_engine.suspend().await;
    tokio::time::sleep(SHUTDOWN_FLUSH_GRACE).await;

    Ok(())
}
