use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{log_debug, log_info, log_warn};

use super::{
    protocol::{ControlMessage, OverlayMessage},
    window::{OverlayGeometry, WindowHost, WindowParts},
};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Unopened,
    Open,
    /// Terminal.
    Closed,
}

type StopCallback = Box<dyn FnOnce() + Send>;

struct Shared {
    state: Mutex<BridgeState>,
    on_stop: Mutex<Option<StopCallback>>,
}

/// Mirrors a running session into a secondary window and relays the
/// window's stop request back.
///
/// A stop message, an external closure, and an explicit [`close`] all end
/// in `Closed`. The first two fire the stop callback; since it is an
/// `FnOnce` taken out under the state lock, it runs at most once however
/// the signals interleave.
///
/// [`close`]: CrossWindowBridge::close
pub struct CrossWindowBridge {
    shared: Arc<Shared>,
    outbound: Option<UnboundedSender<Value>>,
    window_closed: Option<CancellationToken>,
    monitor_cancel: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

impl CrossWindowBridge {
    pub fn new<F>(on_stop: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::Unopened),
                on_stop: Mutex::new(Some(Box::new(on_stop))),
            }),
            outbound: None,
            window_closed: None,
            monitor_cancel: CancellationToken::new(),
            monitor: None,
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the host for an overlay window. A refusal is logged and leaves
    /// the bridge `Unopened`; the caller carries on without it.
    pub fn open(
        &mut self,
        host: &dyn WindowHost,
        task_name: &str,
        geometry: &OverlayGeometry,
        poll_interval: Duration,
    ) -> bool {
        if self.state() != BridgeState::Unopened {
            return false;
        }

        let window = match host.open(&format!("Timer - {task_name}"), geometry) {
            Ok(window) => window,
            Err(err) => {
                log_warn!("Overlay window not opened: {}", err);
                return false;
            }
        };

        let WindowParts {
            outbound,
            inbound,
            closed,
        } = window.into_parts();

        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) = BridgeState::Open;
        self.outbound = Some(outbound);
        self.window_closed = Some(closed.clone());
        self.monitor = Some(tokio::spawn(monitor_window(
            self.shared.clone(),
            inbound,
            closed,
            self.monitor_cancel.clone(),
            poll_interval,
        )));

        log_info!("Cross-window bridge open for '{}'", task_name);
        true
    }

    /// Fire-and-forget; dropped silently unless the bridge is open.
    pub fn push_update(&self, seconds: u64, task_name: &str) {
        if self.state() != BridgeState::Open {
            return;
        }
        if let Some(outbound) = &self.outbound {
            let message = OverlayMessage::UpdateTime {
                seconds,
                task_name: task_name.to_string(),
            };
            let _ = outbound.send(message.to_value());
        }
    }

    /// Tears the bridge down without firing the stop callback. Idempotent.
    pub fn close(&mut self) {
        self.shared
            .on_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) = BridgeState::Closed;

        self.monitor_cancel.cancel();
        self.monitor.take();
        self.outbound.take();
        if let Some(closed) = self.window_closed.take() {
            closed.cancel();
        }
    }
}

impl Drop for CrossWindowBridge {
    fn drop(&mut self) {
        self.close();
    }
}

async fn monitor_window(
    shared: Arc<Shared>,
    mut inbound: UnboundedReceiver<Value>,
    closed: CancellationToken,
    cancel: CancellationToken,
    poll_interval: Duration,
) {
    let mut poll = time::interval_at(Instant::now() + poll_interval, poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            message = inbound.recv() => match message {
                Some(message) => {
                    if ControlMessage::parse(&message) == Some(ControlMessage::Stop) {
                        converge(&shared, "stop message");
                        return;
                    }
                    log_debug!("Ignoring unrecognized overlay message: {}", message);
                }
                None => {
                    converge(&shared, "window dropped");
                    return;
                }
            },
            _ = poll.tick() => {
                if closed.is_cancelled() {
                    converge(&shared, "window closed");
                    return;
                }
            }
        }
    }
}

fn converge(shared: &Shared, reason: &str) {
    let callback = {
        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == BridgeState::Closed {
            return;
        }
        *state = BridgeState::Closed;
        shared
            .on_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    };

    log_info!("Overlay requested stop ({})", reason);
    if let Some(callback) = callback {
        callback();
    }
}
