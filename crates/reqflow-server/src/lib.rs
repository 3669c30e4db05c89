//! reqflow-server: configuration, logging and request handlers
//!
//! This crate wires the query engine into an application:
//! - Configuration loading (defaults, YAML, environment)
//! - Structured logging setup
//! - Batch handler answering many requests with deduplication
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               reqflow-server                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs       - Configuration management │
//! │  observability/  - Logging, metric setup    │
//! │  handlers/       - Request handlers         │
//! │    batch/        - Deduplicated batches     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod handlers;
pub mod observability;

// Re-exports for convenience
pub use config::{ConfigLoadError, EngineConfig};
pub use handlers::batch::{BatchRequest, BatchRequestError, BatchRequestHandler, BatchResponse};
