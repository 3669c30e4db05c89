//! Request handlers built on the query engine.

pub mod batch;
