//! Issuing requests from queries, with deduplication through the cache.

use std::sync::Arc;

use tracing::trace;

use super::{Query, Step};
use crate::block::RequestBlock;
use crate::cache::{CacheEntry, Lookup};
use crate::error::{is_interrupted_only, Exit};
use crate::request::{Deferred, Entry, ListenerGuard, Request};
use crate::resolver::Resolver;

/// Issues `request` against `resolver`.
///
/// With caching on, structurally equal requests share one entry: the first
/// occurrence is scheduled, later ones wait on its result without
/// scheduling anything. A cached result that only records an interruption
/// is dropped from the cache and the request is issued again, so one
/// cancelled caller never denies the answer to everyone else.
pub fn from_request<A: Request>(request: A, resolver: Resolver<A>) -> Query<A::Success, A::Error> {
    Query::from_step(move |ctx| async move {
        if !ctx.caching() {
            let entry = Entry::new(request);
            let wait = await_slot(
                entry.result().clone(),
                ListenerGuard::new(Arc::clone(entry.listeners())),
            );
            return Step::Blocked(RequestBlock::single(&resolver, entry), wait);
        }

        let cache = Arc::clone(ctx.cache());
        match cache.get_either(&request) {
            Lookup::Miss(cached) => {
                let guard = ListenerGuard::new(Arc::clone(cached.listeners()));
                let entry = Entry::with_slot(
                    request,
                    cached.handle().clone(),
                    Arc::clone(cached.listeners()),
                );
                let wait = await_slot(cached.handle().clone(), guard);
                Step::Blocked(RequestBlock::single(&resolver, entry), wait)
            }
            Lookup::Hit(cached) => {
                if cached.handle().poll().as_ref().is_some_and(is_interrupted_only) {
                    trace!(?request, "cached result was interrupted, issuing again");
                    cache.invalidate_when(&request, |current| {
                        current.handle().ptr_eq(cached.handle())
                    });
                    return from_request(request, resolver).step(ctx).await;
                }
                let guard = ListenerGuard::new(Arc::clone(cached.listeners()));
                Step::Blocked(RequestBlock::empty(), await_cached(request, resolver, cached, guard))
            }
        }
    })
}

/// Issues `request` against the resolver produced by `resolver`.
pub fn request_with<A: Request>(
    request: A,
    resolver: Query<Resolver<A>, A::Error>,
) -> Query<A::Success, A::Error> {
    resolver.and_then(move |resolver| from_request(request, resolver))
}

/// Stores a known result for `request` in the current cache.
pub fn cache_request_result<A, E>(request: A, exit: Exit<A::Success, A::Error>) -> Query<(), E>
where
    A: Request,
    E: Send + 'static,
{
    Query::from_step(move |ctx| async move {
        ctx.cache().set(&request, exit);
        Step::Done(Ok(()))
    })
}

fn await_slot<S, E>(slot: Deferred<S, E>, guard: ListenerGuard) -> Query<S, E>
where
    S: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    Query::from_step(move |_| async move {
        let exit = slot.wait().await;
        drop(guard);
        Step::Done(exit)
    })
}

/// Waits on a slot owned by another occurrence of the request.
fn await_cached<A: Request>(
    request: A,
    resolver: Resolver<A>,
    cached: CacheEntry<A>,
    guard: ListenerGuard,
) -> Query<A::Success, A::Error> {
    Query::from_step(move |ctx| async move {
        let exit = cached.handle().wait().await;
        drop(guard);
        if !is_interrupted_only(&exit) {
            return Step::Done(exit);
        }
        // Whoever drove this slot was cancelled; this task was not.
        trace!(?request, "awaited result was interrupted, issuing again");
        ctx.cache()
            .invalidate_when(&request, |current| current.handle().ptr_eq(cached.handle()));
        from_request(request, resolver).step(ctx).await
    })
}
