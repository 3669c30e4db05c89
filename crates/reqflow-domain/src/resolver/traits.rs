//! Traits implemented by backing resolvers.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::ResolverId;
use crate::request::{BlockedEntry, Entry, Request};

/// A backing resolver for requests of type `A`.
///
/// `run_all` receives the ordered steps addressed to this resolver in one
/// dispatch. Each step is one logical round trip; steps must be executed in
/// order. The resolver completes every entry it is given; it may split steps
/// further.
///
/// Returning `Err(e)` fails every entry of the run that is still open with
/// the same cause. Entries still open after `Ok(())` are completed with a
/// defect.
#[async_trait]
pub trait RequestResolver<A: Request>: Send + Sync + 'static {
    async fn run_all(&self, batches: Vec<Vec<Entry<A>>>) -> Result<(), A::Error>;
}

/// Type-erased resolver as stored in request blocks.
///
/// Grouping uses [`DataSource::id`], never structural equality.
pub trait DataSource: fmt::Debug + Send + Sync {
    fn id(&self) -> ResolverId;

    fn name(&self) -> &str;

    /// Runs the given pipelined steps. The future completes once every entry
    /// has been answered.
    fn run_steps(&self, steps: Vec<Vec<BlockedEntry>>) -> BoxFuture<'static, ()>;
}
