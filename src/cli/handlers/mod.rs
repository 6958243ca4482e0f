//! Command handlers
//!
//! `serve` runs the service in this process; the monitoring commands talk
//! to one that is already running.

pub mod monitor;
pub mod serve;

pub use monitor::MonitorCommandHandler;
pub use serve::ServeCommandHandler;
