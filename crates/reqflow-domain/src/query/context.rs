//! Per-scope query settings.

use std::sync::Arc;

use crate::cache::RequestCache;

/// Settings threaded through every step of a query.
///
/// Combinators such as [`Query::with_batching`](super::Query::with_batching)
/// replace a field for one sub-query and all of its continuations; nothing
/// here is global.
#[derive(Debug, Clone)]
pub struct QueryContext {
    batching: bool,
    caching: bool,
    cache: Arc<RequestCache>,
}

impl QueryContext {
    /// Batching and caching on, with a fresh default cache.
    pub fn new() -> Self {
        Self::with_cache_instance(Arc::new(RequestCache::default()))
    }

    /// Batching and caching on, using `cache`.
    pub fn with_cache_instance(cache: Arc<RequestCache>) -> Self {
        Self {
            batching: true,
            caching: true,
            cache,
        }
    }

    pub fn batching(&self) -> bool {
        self.batching
    }

    pub fn caching(&self) -> bool {
        self.caching
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn set_batching(mut self, batching: bool) -> Self {
        self.batching = batching;
        self
    }

    pub fn set_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn set_cache(mut self, cache: Arc<RequestCache>) -> Self {
        self.cache = cache;
        self
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}
