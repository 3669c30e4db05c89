//! Batch request handler with request deduplication.
//!
//! This handler answers many requests to one resolver in a single call,
//! relying on the engine for:
//!
//! 1. **Batching**: all distinct requests go to the resolver in one round trip
//! 2. **Deduplication**: identical requests share one entry through the
//!    request cache, both within a batch and across concurrent batches that
//!    share a context
//!
//! Results are returned in the order of the submitted requests. A failure is
//! reported on the item that produced it and never fails its neighbours.

mod handler;
mod types;

pub use handler::BatchRequestHandler;
pub use types::{
    BatchItemResult, BatchRequest, BatchRequestError, BatchRequestResult, BatchResponse,
    DEFAULT_MAX_BATCH_SIZE,
};
