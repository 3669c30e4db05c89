//! Resolvers: the backing data sources that answer batches of requests.
//!
//! A [`Resolver`] is a cloneable handle around a [`RequestResolver`]
//! implementation. Its [`ResolverId`] is allocated once, at construction, and
//! shared by every clone: requests are only batched together when they were
//! issued against the *same* resolver value. Two resolvers built from the
//! same configuration are distinct, and combinators such as
//! [`Resolver::batch_n`] produce a new identity.

mod batched;
mod traits;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::Cause;
use crate::request::{downcast_entry, BlockedEntry, Entry, Request};

pub use traits::{DataSource, RequestResolver};

static NEXT_RESOLVER_ID: AtomicU64 = AtomicU64::new(1);

/// Reference identity of a resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolverId(u64);

impl ResolverId {
    fn next() -> Self {
        Self(NEXT_RESOLVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resolver#{}", self.0)
    }
}

/// Handle to a resolver for requests of type `A`.
pub struct Resolver<A: Request> {
    id: ResolverId,
    name: Arc<str>,
    inner: Arc<dyn RequestResolver<A>>,
}

impl<A: Request> Resolver<A> {
    /// Wraps a resolver implementation, giving it a fresh identity.
    pub fn new<R>(name: impl Into<String>, resolver: R) -> Self
    where
        R: RequestResolver<A>,
    {
        Self::from_arc(name, Arc::new(resolver))
    }

    fn from_arc(name: impl Into<String>, inner: Arc<dyn RequestResolver<A>>) -> Self {
        let name: String = name.into();
        Self {
            id: ResolverId::next(),
            name: Arc::from(name),
            inner,
        }
    }

    pub fn id(&self) -> ResolverId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns this resolver as a type-erased data source sharing its identity.
    pub fn data_source(&self) -> Arc<dyn DataSource> {
        Arc::new(self.clone())
    }
}

impl<A: Request> Clone for Resolver<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Request> fmt::Debug for Resolver<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl<A: Request> DataSource for Resolver<A> {
    fn id(&self) -> ResolverId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn run_steps(&self, steps: Vec<Vec<BlockedEntry>>) -> BoxFuture<'static, ()> {
        let batches: Vec<Vec<Entry<A>>> = steps
            .iter()
            .map(|step| {
                step.iter()
                    .filter_map(|entry| {
                        let typed = downcast_entry::<A>(entry);
                        if typed.is_none() {
                            warn!(
                                resolver = %self.name,
                                entry = %entry.id(),
                                "BUG: entry routed to a resolver of another request type"
                            );
                        }
                        typed
                    })
                    .collect()
            })
            .collect();

        let inner = Arc::clone(&self.inner);
        let name = Arc::clone(&self.name);
        Box::pin(run_batches(inner, name, batches))
    }
}

/// Runs one dispatch against a resolver and enforces its contract on the
/// entries it was handed.
async fn run_batches<A: Request>(
    inner: Arc<dyn RequestResolver<A>>,
    name: Arc<str>,
    batches: Vec<Vec<Entry<A>>>,
) {
    let entries: Vec<Entry<A>> = batches.iter().flatten().cloned().collect();

    match inner.run_all(batches).await {
        Ok(()) => {
            let unanswered = entries
                .iter()
                .filter(|entry| entry.complete(Err(Cause::die("resolver did not complete request"))))
                .count();
            if unanswered > 0 {
                warn!(resolver = %name, unanswered, "resolver left requests unanswered");
            }
        }
        Err(error) => {
            debug!(resolver = %name, requests = entries.len(), ?error, "resolver failed whole run");
            for entry in &entries {
                entry.complete(Err(Cause::Fail(error.clone())));
            }
        }
    }
}
