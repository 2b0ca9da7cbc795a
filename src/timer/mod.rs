pub mod controller;
pub mod state;

pub use controller::{TimerController, TimerEvent, TimerSnapshot};
pub use state::{
    format_clock, TickOutcome, TimerMode, TimerState, TimerStatus, Visibility,
    DEFAULT_DURATION_MINUTES,
};
