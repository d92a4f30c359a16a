mod app;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod port_manager;
pub mod process;
pub mod server_log;
pub mod server_spawner;
pub mod signals;
pub mod window;

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tauri::{AppHandle, Manager, RunEvent, Runtime};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tracing::{error, info, warn};

use app::{APP_NAME, APP_VERSION};
use config::LauncherConfig;
use error::LaunchError;
use lifecycle::ShellLifecycle;
use signals::TerminationSignals;
use window::TauriWindowHost;

// Only consulted by the panic hook; everything else gets the lifecycle from Tauri state
static PANIC_CLEANUP: OnceCell<Arc<ShellLifecycle>> = OnceCell::new();

/// Kill the backend from the panic hook
pub fn cleanup_on_panic() {
    if let Some(lifecycle) = PANIC_CLEANUP.get() {
        lifecycle.emergency_stop();
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let config = LauncherConfig::load();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(config.log_level))
        .init();

    info!("Starting {} v{}", APP_NAME, APP_VERSION);
    config.log_source();

    let lifecycle = Arc::new(ShellLifecycle::new(config));
    let _ = PANIC_CLEANUP.set(lifecycle.clone());

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(lifecycle)
        .setup(|app| {
            let lifecycle = app.state::<Arc<ShellLifecycle>>().inner().clone();
            watch_termination_signals(app.handle().clone(), lifecycle.clone());
            launch(app.handle().clone(), lifecycle);
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        // ExitRequested is the "about to quit" signal; Exit catches paths that skip it
        if let RunEvent::ExitRequested { .. } | RunEvent::Exit = event {
            app_handle.state::<Arc<ShellLifecycle>>().shutdown();
        }
    });
}

/// Startup sequence: spawn the backend now, open the window later
fn launch<R: Runtime>(app: AppHandle<R>, lifecycle: Arc<ShellLifecycle>) {
    info!("Readiness mode: {:?}", lifecycle.config().readiness.mode);

    if let Err(e) = lifecycle.start_backend() {
        error!("Backend failed to start: {}", e);
        report_fatal(&app, &e);
        return;
    }

    tauri::async_runtime::spawn(async move {
        let host = TauriWindowHost::new(app.clone());
        match lifecycle.open_window_when_ready(&host).await {
            Ok(true) => info!("Backend window is up"),
            Ok(false) => {}
            Err(e) => {
                error!("Could not open backend window: {}", e);
                report_fatal(&app, &e);
            }
        }
    });
}

/// Signals from the terminal or the OS stop the backend and quit the app
fn watch_termination_signals<R: Runtime>(app: AppHandle<R>, lifecycle: Arc<ShellLifecycle>) {
    tauri::async_runtime::spawn(async move {
        let mut signals = match TerminationSignals::install() {
            Ok(signals) => signals,
            Err(e) => {
                warn!("Could not install termination signal handlers: {}", e);
                return;
            }
        };
        lifecycle.shutdown_on_signal(&mut signals).await;
        app.exit(0);
    });
}

/// Tell the user what went wrong, then quit (which stops the backend)
fn report_fatal<R: Runtime>(app: &AppHandle<R>, err: &LaunchError) {
    let handle = app.clone();
    app.dialog()
        .message(err.to_string())
        .title(format!("{} could not start", APP_NAME))
        .kind(MessageDialogKind::Error)
        .show(move |_| handle.exit(1));
}
