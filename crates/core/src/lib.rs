pub mod config;
pub mod error;

pub use config::{LabConfig, MonitorSettings, ParallelSettings, PoolSettings, RuntimeSettings};
pub use error::*;
