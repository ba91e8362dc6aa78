pub mod controller;
pub mod overlay;
pub mod protocol;
pub mod window;

pub use controller::{BridgeState, CrossWindowBridge};
pub use overlay::LocalWindowHost;
pub use protocol::{ControlMessage, OverlayMessage};
pub use window::{window_pair, OpenError, OverlayGeometry, RemoteWindow, WindowHandle, WindowHost};
