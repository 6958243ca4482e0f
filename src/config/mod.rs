//! Layered configuration for diet-batch
//!
//! # Configuration Priority (lowest to highest)
//! 1. `default.toml` - Base default configuration
//! 2. `{environment}.toml` - Environment-specific configuration
//! 3. `local.toml` - Local overrides (not committed to version control)
//! 4. `DIET_*` environment variables

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    AirtableConfig, JobOverride, NotificationsConfig, PersistenceBackend, PersistenceConfig,
    ProcessorConfig, SchedulerConfig, Settings,
};
