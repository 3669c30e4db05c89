//! Data types for batch request operations.

use reqflow_domain::{Exit, Request};

/// Maximum batch size when none is configured.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// A batch of requests to answer together.
#[derive(Debug, Clone)]
pub struct BatchRequest<A: Request> {
    /// The requests, answered in this order.
    pub requests: Vec<A>,
}

impl<A: Request> BatchRequest<A> {
    /// Creates a new batch request.
    pub fn new(requests: Vec<A>) -> Self {
        Self { requests }
    }
}

impl<A: Request> FromIterator<A> for BatchRequest<A> {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Outcome of a single request within a batch.
pub type BatchItemResult<A> = Exit<<A as Request>::Success, <A as Request>::Error>;

/// Response from a batch operation.
#[derive(Debug, Clone)]
pub struct BatchResponse<A: Request> {
    /// Results for each request, in the same order as the batch.
    pub results: Vec<BatchItemResult<A>>,
}

impl<A: Request> BatchResponse<A> {
    /// Number of items that failed for any reason.
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|result| result.is_err()).count()
    }
}

/// Errors that reject a batch as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchRequestError {
    /// The batch request is empty.
    #[error("batch request cannot be empty")]
    EmptyBatch,

    /// The batch request exceeds the maximum allowed size.
    #[error("batch size {size} exceeds maximum allowed {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// The engine stopped before answering the batch.
    #[error("batch execution failed: {0}")]
    Execution(String),
}

/// Result type for batch operations.
pub type BatchRequestResult<T> = Result<T, BatchRequestError>;
