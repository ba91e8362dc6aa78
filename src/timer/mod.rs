pub mod clock;
pub mod commands;
pub mod controller;
pub mod state;

pub use clock::Clock;
pub use controller::{TimerConfig, TimerController, TimerEvent, TimerSnapshot};
pub use state::{TimerState, TimerStatus};
