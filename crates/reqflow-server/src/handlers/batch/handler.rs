//! Batch request handler implementation.

use std::collections::HashSet;

use reqflow_domain::{from_request, Query, QueryContext, Request, Resolver};
use tracing::{debug, warn};

use super::types::{
    BatchRequest, BatchRequestError, BatchRequestResult, BatchResponse, DEFAULT_MAX_BATCH_SIZE,
};
use crate::config::EngineConfig;

/// Handler answering batches of requests against one resolver.
///
/// Every call runs its requests as one parallel query, so distinct requests
/// reach the resolver together and identical ones share a single entry.
/// Handlers built from the same context share its request cache: concurrent
/// batches asking for the same request wait on one answer, and later batches
/// reuse it until the cache entry expires.
pub struct BatchRequestHandler<A: Request> {
    resolver: Resolver<A>,
    ctx: QueryContext,
    max_batch_size: usize,
}

impl<A: Request> BatchRequestHandler<A> {
    /// Creates a new batch handler running queries in `ctx`.
    pub fn new(resolver: Resolver<A>, ctx: QueryContext) -> Self {
        Self {
            resolver,
            ctx,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    /// Creates a handler with a context and batch limit taken from `config`.
    pub fn from_config(resolver: Resolver<A>, config: &EngineConfig) -> Self {
        Self::new(resolver, config.query_context()).with_max_batch_size(config.engine.max_batch_size)
    }

    /// Sets the largest batch `execute` accepts.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// The context batches run in.
    pub fn context(&self) -> &QueryContext {
        &self.ctx
    }

    /// Validates a batch request.
    pub fn validate(&self, request: &BatchRequest<A>) -> BatchRequestResult<()> {
        if request.requests.is_empty() {
            return Err(BatchRequestError::EmptyBatch);
        }

        if request.requests.len() > self.max_batch_size {
            return Err(BatchRequestError::BatchTooLarge {
                size: request.requests.len(),
                max: self.max_batch_size,
            });
        }

        Ok(())
    }

    /// Executes a batch request.
    ///
    /// The results are returned in the same order as the input requests.
    pub async fn execute(&self, request: BatchRequest<A>) -> BatchRequestResult<BatchResponse<A>> {
        self.validate(&request)?;

        let (total, unique) = self.dedup_stats(&request);
        debug!(
            resolver = self.resolver.name(),
            total, unique, "executing batch request"
        );

        let resolver = self.resolver.clone();
        let query = Query::foreach_par(request.requests, move |request| {
            from_request(request, resolver.clone()).exit::<A::Error>()
        });

        match query.run(self.ctx.clone()).await {
            Ok(results) => Ok(BatchResponse { results }),
            // Per-item failures are captured above, so only a broken engine
            // run lands here.
            Err(cause) => {
                warn!(resolver = self.resolver.name(), ?cause, "batch execution failed");
                Err(BatchRequestError::Execution(format!("{cause:?}")))
            }
        }
    }

    /// Returns statistics about deduplication for a batch request.
    /// Returns (total_requests, unique_requests).
    pub fn dedup_stats(&self, request: &BatchRequest<A>) -> (usize, usize) {
        let unique: HashSet<&A> = request.requests.iter().collect();
        (request.requests.len(), unique.len())
    }
}
