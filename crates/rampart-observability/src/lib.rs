//! # rampart-observability
//!
//! Logging and metrics infrastructure shared by the Rampart crates.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use metrics::register_metrics;
