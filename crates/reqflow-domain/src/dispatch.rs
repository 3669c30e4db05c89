//! Submitting flattened blocks to their resolvers.

use futures::future::join_all;
use tracing::debug;

use crate::block::RequestBlock;
use crate::scheduler::flatten;

/// Dispatches every request in `block` and waits for the resolvers.
///
/// Batches run in submission order. Within one batch, each resolver gets
/// all of its steps in a single call and different resolvers run
/// concurrently.
///
/// # Metrics
///
/// - `reqflow_batches_dispatched_total` - One per resolver call
/// - `reqflow_requests_dispatched_total` - Requests handed to resolvers
pub async fn run_block(block: RequestBlock) {
    if block.is_empty() {
        return;
    }

    for (round, collection) in flatten(block).into_iter().enumerate() {
        let runs = collection.into_groups().into_iter().map(|(resolver, steps)| {
            let requests: usize = steps.iter().map(Vec::len).sum();
            debug!(
                round,
                resolver = resolver.name(),
                steps = steps.len(),
                requests,
                "dispatching batch"
            );
            metrics::counter!("reqflow_batches_dispatched_total").increment(1);
            metrics::counter!("reqflow_requests_dispatched_total").increment(requests as u64);
            resolver.run_steps(steps)
        });
        join_all(runs).await;
    }
}

/// Registers dispatch metrics descriptions.
///
/// Call this function once during application startup to register metric
/// descriptions with the metrics recorder.
pub fn register_dispatch_metrics() {
    metrics::describe_counter!(
        "reqflow_batches_dispatched_total",
        "Total number of resolver calls made by the batch scheduler"
    );
    metrics::describe_counter!(
        "reqflow_requests_dispatched_total",
        "Total number of requests handed to resolvers"
    );
}
