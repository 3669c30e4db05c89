//! Observability setup for reqflow.
//!
//! - Structured logging configuration
//! - Metric descriptions for the engine's counters

mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig};

/// Registers descriptions for every metric the engine publishes.
///
/// Install a `metrics` recorder first; without one the counters are no-ops.
pub fn register_metrics() {
    reqflow_domain::register_metrics();
}
