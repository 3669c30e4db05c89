//! Request cache with TTL and race-safe invalidation.
//!
//! Maps request values to the result slot of the entry that answers them, so
//! concurrent and later occurrences of an equal request share one resolver
//! call. Requests of different types live in the same map: keys are compared
//! by type first, then by value.
//!
//! # Expiry
//!
//! Entries expire `default_ttl` after insertion. Expiry is measured with
//! `tokio::time::Instant`, so tests driving a paused clock with
//! `tokio::time::advance` observe it. Expired entries read as misses and are
//! replaced on the next [`RequestCache::get_either`].
//!
//! # Capacity
//!
//! When a new key would exceed `max_capacity`, expired entries are dropped
//! first, then the oldest entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use reqflow_domain::cache::{Lookup, RequestCache, RequestCacheConfig};
//! use std::time::Duration;
//!
//! let cache = RequestCache::new(RequestCacheConfig::default().with_ttl(Duration::from_secs(60)));
//!
//! match cache.get_either(&GetUser(1)) {
//!     Lookup::Miss(entry) => { /* schedule the request, completing entry.handle() */ }
//!     Lookup::Hit(entry) => { /* await entry.handle() */ }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::Exit;
use crate::request::{Deferred, Listeners, Request};

/// Configuration for the request cache.
#[derive(Debug, Clone)]
pub struct RequestCacheConfig {
    /// Maximum number of entries in the cache.
    pub max_capacity: usize,
    /// Time to live of each entry, from insertion.
    pub default_ttl: Duration,
}

impl Default for RequestCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 65_536,
            default_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl RequestCacheConfig {
    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Object-safe equality and hashing for request values of any type.
trait RequestKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn key_eq(&self, other: &dyn RequestKey) -> bool;
    fn key_hash(&self, state: &mut dyn Hasher);
    fn key_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
    fn boxed_clone(&self) -> Box<dyn RequestKey>;
}

impl<A: Request> RequestKey for A {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn key_eq(&self, other: &dyn RequestKey) -> bool {
        other.as_any().downcast_ref::<A>() == Some(self)
    }

    fn key_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<A>().hash(&mut state);
        self.hash(&mut state);
    }

    fn key_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }

    fn boxed_clone(&self) -> Box<dyn RequestKey> {
        Box::new(self.clone())
    }
}

struct ErasedKey(Box<dyn RequestKey>);

impl ErasedKey {
    fn new<A: Request>(request: &A) -> Self {
        Self(Box::new(request.clone()))
    }
}

impl PartialEq for ErasedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.key_eq(other.0.as_ref())
    }
}

impl Eq for ErasedKey {}

impl Hash for ErasedKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key_hash(state);
    }
}

impl fmt::Debug for ErasedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.key_debug(f)
    }
}

/// A cached result slot for one request value.
pub struct CacheEntry<A: Request> {
    listeners: Arc<Listeners>,
    handle: Deferred<A::Success, A::Error>,
    inserted_at: Instant,
}

impl<A: Request> CacheEntry<A> {
    fn new(inserted_at: Instant) -> Self {
        Self {
            listeners: Arc::new(Listeners::new()),
            handle: Deferred::new(),
            inserted_at,
        }
    }

    /// Tasks currently awaiting this entry.
    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.listeners
    }

    /// The result slot shared by every occurrence of the request.
    pub fn handle(&self) -> &Deferred<A::Success, A::Error> {
        &self.handle
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }
}

impl<A: Request> Clone for CacheEntry<A> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            handle: self.handle.clone(),
            inserted_at: self.inserted_at,
        }
    }
}

impl<A: Request> fmt::Debug for CacheEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("listeners", &self.listeners.count())
            .field("handle", &self.handle)
            .field("inserted_at", &self.inserted_at)
            .finish()
    }
}

/// Outcome of [`RequestCache::get_either`].
#[derive(Debug, Clone)]
pub enum Lookup<A: Request> {
    /// An entry for an equal request already exists.
    Hit(CacheEntry<A>),
    /// A fresh entry was registered; the caller must arrange for its handle
    /// to be completed.
    Miss(CacheEntry<A>),
}

struct Stored {
    entry: Box<dyn Any + Send + Sync>,
    inserted_at: Instant,
}

impl Stored {
    fn new<A: Request>(entry: CacheEntry<A>) -> Self {
        let inserted_at = entry.inserted_at;
        Self {
            entry: Box::new(entry),
            inserted_at,
        }
    }

    fn typed<A: Request>(&self) -> Option<&CacheEntry<A>> {
        self.entry.downcast_ref::<CacheEntry<A>>()
    }
}

/// Concurrent cache of request result slots.
///
/// Every operation mutates one key atomically through the `DashMap` entry
/// API and never holds a shard lock across an await.
pub struct RequestCache {
    entries: DashMap<ErasedKey, Stored>,
    config: RequestCacheConfig,
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("config", &self.config)
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

impl RequestCache {
    /// Creates a new request cache with the given configuration.
    pub fn new(config: RequestCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &RequestCacheConfig {
        &self.config
    }

    fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) >= self.config.default_ttl
    }

    /// Returns the live entry for `request`, or atomically registers a new
    /// one.
    ///
    /// # Metrics
    ///
    /// - `reqflow_cache_hits_total` - Incremented on hit
    /// - `reqflow_cache_misses_total` - Incremented on miss
    pub fn get_either<A: Request>(&self, request: &A) -> Lookup<A> {
        let key = ErasedKey::new(request);
        if self.entries.len() >= self.config.max_capacity && !self.entries.contains_key(&key) {
            self.make_room();
        }

        let now = Instant::now();
        let lookup = match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                let live = match occupied.get().typed::<A>() {
                    Some(entry) if !self.is_expired(entry.inserted_at, now) => Some(entry.clone()),
                    _ => None,
                };
                match live {
                    Some(entry) => Lookup::Hit(entry),
                    None => {
                        let entry = CacheEntry::new(now);
                        occupied.insert(Stored::new(entry.clone()));
                        Lookup::Miss(entry)
                    }
                }
            }
            MapEntry::Vacant(vacant) => {
                let entry = CacheEntry::new(now);
                vacant.insert(Stored::new(entry.clone()));
                Lookup::Miss(entry)
            }
        };

        match &lookup {
            Lookup::Hit(_) => {
                metrics::counter!("reqflow_cache_hits_total").increment(1);
                trace!(?request, "request cache hit");
            }
            Lookup::Miss(_) => {
                metrics::counter!("reqflow_cache_misses_total").increment(1);
                trace!(?request, "request cache miss");
            }
        }
        lookup
    }

    /// Returns the live entry for `request` without registering one.
    pub fn get<A: Request>(&self, request: &A) -> Option<CacheEntry<A>> {
        let now = Instant::now();
        self.entries
            .get(&ErasedKey::new(request))
            .and_then(|stored| stored.typed::<A>().cloned())
            .filter(|entry| !self.is_expired(entry.inserted_at, now))
    }

    /// Stores an already known result for `request`, replacing any entry.
    pub fn set<A: Request>(&self, request: &A, exit: Exit<A::Success, A::Error>) {
        let key = ErasedKey::new(request);
        if self.entries.len() >= self.config.max_capacity && !self.entries.contains_key(&key) {
            self.make_room();
        }
        let entry = CacheEntry::<A>::new(Instant::now());
        entry.handle.complete(exit);
        self.entries.insert(key, Stored::new(entry));
    }

    /// Removes the entry for `request`.
    pub fn invalidate<A: Request>(&self, request: &A) {
        self.entries.remove(&ErasedKey::new(request));
    }

    /// Removes the entry for `request` only if `predicate` accepts it.
    ///
    /// The check and the removal happen under the same shard lock, so a
    /// concurrent repopulation is never removed by a stale predicate.
    /// Returns true if an entry was removed.
    pub fn invalidate_when<A, F>(&self, request: &A, predicate: F) -> bool
    where
        A: Request,
        F: FnOnce(&CacheEntry<A>) -> bool,
    {
        self.entries
            .remove_if(&ErasedKey::new(request), |_, stored| {
                stored.typed::<A>().map_or(false, predicate)
            })
            .is_some()
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, stored| !self.is_expired(stored.inserted_at, now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Listener count of the live entry for `request`.
    pub fn listeners<A: Request>(&self, request: &A) -> Option<Arc<Listeners>> {
        self.get(request).map(|entry| Arc::clone(&entry.listeners))
    }

    fn make_room(&self) {
        let expired = self.evict_expired();
        if expired > 0 {
            debug!(expired, "evicted expired request cache entries");
        }
        while self.entries.len() >= self.config.max_capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|item| item.value().inserted_at)
                .map(|item| ErasedKey(item.key().0.boxed_clone()));
            match oldest {
                Some(key) => {
                    trace!(?key, "evicting oldest request cache entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new(RequestCacheConfig::default())
    }
}

/// Registers request cache metrics descriptions.
///
/// Call this function once during application startup to register metric
/// descriptions with the metrics recorder.
///
/// # Metrics Registered
///
/// - `reqflow_cache_hits_total` - Total number of request cache hits
/// - `reqflow_cache_misses_total` - Total number of request cache misses
pub fn register_request_cache_metrics() {
    metrics::describe_counter!(
        "reqflow_cache_hits_total",
        "Total number of request cache hits"
    );
    metrics::describe_counter!(
        "reqflow_cache_misses_total",
        "Total number of request cache misses"
    );
}
