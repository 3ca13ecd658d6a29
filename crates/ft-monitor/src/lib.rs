//! Activity observation and focus tracking runtime.
//!
//! Three pollers (foreground window, input idle, heartbeat) feed a single
//! [`Tracker`] actor that drives segment aggregation and classification.

pub mod heartbeat;
pub mod idle;
pub mod observer;
mod poller;
pub mod source;
pub mod tracker;

pub use heartbeat::{HEARTBEAT_INTERVAL, Heartbeat, Tick};
pub use idle::{DEFAULT_IDLE_THRESHOLD, IDLE_POLL_INTERVAL, IdleDetector, IdleTransition};
pub use observer::{WINDOW_POLL_INTERVAL, WindowChanged, WindowObserver};
pub use source::{
    ForegroundWindowSource, InputIdleSource, WindowSample, XdotoolWindowSource, XprintidleSource,
};
pub use tracker::{
    DEFAULT_CLASSIFY_TIMEOUT, FLUSH_EVERY_TICKS, MonitorError, Tracker, TrackerConfig,
    TrackerEvent, TrackerHandle, TrackerSnapshot,
};
