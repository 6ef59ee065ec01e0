//! Configuration, paths and logging for the test result dispatcher.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, ServerConfig, ServerSettings, DEFAULT_DISCARD_THRESHOLD, DEFAULT_LOG_LEVEL,
    DEFAULT_QUIET_PERIOD_BASE_SECS, DEFAULT_QUIET_PERIOD_MAX_SECS, DEFAULT_TICK_PERIOD_MS,
    MAX_QUIET_PERIOD_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
