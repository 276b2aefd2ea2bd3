//! Event-loop lag monitoring for a cooperative single-threaded runtime.
//!
//! A [`LagMonitor`] wakes up on a fixed cadence and measures how late each
//! wake-up was. Running one of the [`blocking`] demos on the same runtime
//! thread makes that lateness visible.

pub mod blocking;
pub mod error;
pub mod monitor;
pub mod session;
pub mod window;

pub use blocking::{run_blocking_demo, BlockingMode, BlockingOutcome, CancelFlag, Interruption};
pub use error::MonitorError;
pub use monitor::{
    LagMonitor, LagMonitorConfig, MonitorEvent, MonitorHandle, MonitorReport, StopHandle,
    StopReason,
};
pub use session::{LagSample, LagStats, MonitorSession, TickReport};
pub use window::RingBuffer;
