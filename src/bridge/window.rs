use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// Requested size of the secondary surface. Hosts place it at their
/// top-right corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayGeometry {
    pub width: u32,
    pub height: u32,
    pub always_on_top: bool,
}

impl Default for OverlayGeometry {
    fn default() -> Self {
        Self {
            width: 200,
            height: 100,
            always_on_top: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("window creation was blocked by the host")]
    Blocked,
    #[error("window host unavailable: {0}")]
    Unavailable(String),
}

/// Creates secondary presentation contexts.
pub trait WindowHost: Send + Sync {
    fn open(&self, title: &str, geometry: &OverlayGeometry) -> Result<WindowHandle, OpenError>;
}

/// Primary-side end of an open secondary context.
pub struct WindowHandle {
    outbound: UnboundedSender<Value>,
    inbound: UnboundedReceiver<Value>,
    closed: CancellationToken,
}

/// The secondary context's end. Dropping it counts as the window being
/// closed.
pub struct RemoteWindow {
    inbound: UnboundedReceiver<Value>,
    controls: RemoteControls,
}

/// Cloneable handle for acting on behalf of the secondary context
/// (posting back, closing) while its receiver lives elsewhere.
#[derive(Clone)]
pub struct RemoteControls {
    outbound: UnboundedSender<Value>,
    closed: CancellationToken,
}

pub fn window_pair() -> (WindowHandle, RemoteWindow) {
    let (to_remote, from_primary) = mpsc::unbounded_channel();
    let (to_primary, from_remote) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();

    let handle = WindowHandle {
        outbound: to_remote,
        inbound: from_remote,
        closed: closed.clone(),
    };
    let remote = RemoteWindow {
        inbound: from_primary,
        controls: RemoteControls {
            outbound: to_primary,
            closed,
        },
    };
    (handle, remote)
}

/// Parts a [`WindowHandle`] splits into so the sender, receiver and
/// closure flag can live in different tasks.
pub struct WindowParts {
    pub outbound: UnboundedSender<Value>,
    pub inbound: UnboundedReceiver<Value>,
    pub closed: CancellationToken,
}

impl WindowHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn into_parts(self) -> WindowParts {
        WindowParts {
            outbound: self.outbound,
            inbound: self.inbound,
            closed: self.closed,
        }
    }
}

impl RemoteWindow {
    /// Next message from the primary, or `None` once either side closed.
    pub async fn recv(&mut self) -> Option<Value> {
        tokio::select! {
            biased;
            _ = self.controls.closed.cancelled() => None,
            message = self.inbound.recv() => message,
        }
    }

    pub fn controls(&self) -> RemoteControls {
        self.controls.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.controls.is_closed()
    }
}

impl Drop for RemoteWindow {
    fn drop(&mut self) {
        self.controls.close();
    }
}

impl RemoteControls {
    /// Returns false when the primary side is gone.
    pub fn post(&self, message: Value) -> bool {
        !self.is_closed() && self.outbound.send(message).is_ok()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
