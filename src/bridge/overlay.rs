use std::{
    io::Write,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{log_debug, log_info, utils::format::format_clock};

use super::{
    protocol::{ControlMessage, OverlayMessage},
    window::{window_pair, OpenError, OverlayGeometry, RemoteControls, RemoteWindow, WindowHandle, WindowHost},
};

const ENABLE_LOGS: bool = true;

/// In-process overlay surface that renders the live timer line on stderr.
///
/// Only one overlay is tracked at a time; opening a new one forgets the
/// previous controls.
#[derive(Clone)]
pub struct LocalWindowHost {
    enabled: bool,
    active: Arc<Mutex<Option<RemoteControls>>>,
}

impl LocalWindowHost {
    /// A disabled host behaves like a popup blocker.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|controls| !controls.is_closed())
    }

    /// The overlay's STOP button: posts the stop literal, then closes.
    pub fn press_stop(&self) -> bool {
        match self.take_active() {
            Some(controls) => {
                controls.post(ControlMessage::Stop.to_value());
                controls.close();
                true
            }
            None => false,
        }
    }

    /// The user closing the overlay window without pressing STOP.
    pub fn close_window(&self) -> bool {
        match self.take_active() {
            Some(controls) => {
                controls.close();
                true
            }
            None => false,
        }
    }

    fn take_active(&self) -> Option<RemoteControls> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .filter(|controls| !controls.is_closed())
    }
}

impl WindowHost for LocalWindowHost {
    fn open(&self, title: &str, geometry: &OverlayGeometry) -> Result<WindowHandle, OpenError> {
        if !self.enabled {
            return Err(OpenError::Blocked);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| OpenError::Unavailable(err.to_string()))?;

        let (window, remote) = window_pair();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(remote.controls());
        runtime.spawn(render_overlay(title.to_string(), remote));

        log_info!(
            "Overlay '{}' opened ({}x{}, always on top: {})",
            title,
            geometry.width,
            geometry.height,
            geometry.always_on_top
        );
        Ok(window)
    }
}

async fn render_overlay(title: String, mut remote: RemoteWindow) {
    let mut stderr = std::io::stderr();

    while let Some(message) = remote.recv().await {
        match serde_json::from_value::<OverlayMessage>(message) {
            Ok(OverlayMessage::UpdateTime { seconds, task_name }) => {
                let _ = write!(stderr, "\r[{}] {}  ", task_name, format_clock(seconds));
                let _ = stderr.flush();
            }
            Err(_) => {
                log_debug!("Overlay '{}' ignored an unrecognized message", title);
            }
        }
    }

    let _ = writeln!(stderr);
    log_info!("Overlay '{}' closed", title);
}
