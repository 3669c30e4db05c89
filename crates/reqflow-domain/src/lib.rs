//! reqflow-domain: automatic request batching and deduplication
//!
//! Independently written queries issue logical requests against resolvers
//! without knowing about each other. This crate discovers which requests can
//! share a round trip, which must stay ordered, and which are duplicates of
//! an answer that is already in flight or cached.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               reqflow-domain                │
//! ├─────────────────────────────────────────────┤
//! │  request/    - Entries, result slots        │
//! │  block/      - Request block algebra        │
//! │  collection  - Per-resolver batches         │
//! │  scheduler/  - Flatten / step / merge       │
//! │  resolver/   - Backing resolvers            │
//! │  cache/      - Request cache                │
//! │  query/      - Query combinators, dedup     │
//! │  dispatch    - Submitting batches           │
//! └─────────────────────────────────────────────┘
//! ```

pub mod block;
pub mod cache;
pub mod collection;
pub mod dispatch;
pub mod error;
pub mod query;
pub mod request;
pub mod resolver;
pub mod scheduler;

// Re-export commonly used types at the crate root
pub use block::RequestBlock;
pub use cache::{Lookup, RequestCache, RequestCacheConfig};
pub use error::{Cause, Exit};
pub use query::{cache_request_result, from_request, request_with, Query, QueryContext, Step};
pub use request::{Entry, Request};
pub use resolver::{DataSource, RequestResolver, Resolver, ResolverId};

/// Registers descriptions for every metric this crate publishes.
pub fn register_metrics() {
    cache::register_request_cache_metrics();
    dispatch::register_dispatch_metrics();
}
