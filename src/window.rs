use tauri::ipc::CapabilityBuilder;
use tauri::{AppHandle, Manager, Runtime, WebviewUrl, WebviewWindowBuilder};
use tracing::info;

use crate::app::MAIN_WINDOW_LABEL;
use crate::config::WindowConfig;
use crate::error::{LaunchError, LaunchResult};

/// Everything needed to build the backend window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub label: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
    pub context_isolation: bool,
}

impl WindowSpec {
    pub fn from_config(config: &WindowConfig) -> Self {
        Self {
            label: MAIN_WINDOW_LABEL.to_string(),
            title: config.title.clone(),
            width: config.width,
            height: config.height,
            url: config.url.clone(),
            context_isolation: config.context_isolation,
        }
    }
}

/// Something that can put a window on screen
pub trait WindowHost {
    fn open(&self, spec: &WindowSpec) -> LaunchResult<()>;
}

/// Opens windows through the running Tauri app
pub struct TauriWindowHost<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriWindowHost<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> WindowHost for TauriWindowHost<R> {
    fn open(&self, spec: &WindowSpec) -> LaunchResult<()> {
        let url = tauri::Url::parse(&spec.url).map_err(|e| LaunchError::InvalidUrl {
            url: spec.url.clone(),
            reason: e.to_string(),
        })?;

        // Remote pages get no IPC unless a capability names them, so isolation
        // is the default and only turning it off needs work
        if !spec.context_isolation {
            self.app
                .add_capability(
                    CapabilityBuilder::new("backend-ipc")
                        .remote(spec.url.clone())
                        .window(spec.label.clone())
                        .permission("core:default"),
                )
                .map_err(|e| LaunchError::Window(e.to_string()))?;
        }

        let window = WebviewWindowBuilder::new(&self.app, spec.label.as_str(), WebviewUrl::External(url))
            .title(spec.title.as_str())
            .inner_size(spec.width as f64, spec.height as f64)
            .build()
            .map_err(|e| LaunchError::Window(e.to_string()))?;

        info!(
            "Opened {} ({}x{}, isolated: {})",
            spec.url, spec.width, spec.height, spec.context_isolation
        );

        // Always open DevTools in debug/development builds
        #[cfg(debug_assertions)]
        window.open_devtools();

        #[cfg(not(debug_assertions))]
        let _ = window;

        Ok(())
    }
}
