//! Shared resolvers for the integration tests.
//!
//! Each integration test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqflow_domain::{from_request, Query, QueryContext, Request, RequestCache, RequestCacheConfig, Resolver};
use tokio::sync::watch;

/// User ids 1..=26, named "a" through "z".
pub fn user_ids() -> Vec<u32> {
    (1..=26).collect()
}

pub fn user_name(id: u32) -> Option<String> {
    if (1..=26).contains(&id) {
        char::from_u32('a' as u32 + id - 1).map(String::from)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserRequest {
    GetAllIds,
    GetNameById(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserValue {
    Ids(Vec<u32>),
    Name(String),
}

impl Request for UserRequest {
    type Success = UserValue;
    type Error = String;
}

/// The user resolver and its counters.
#[derive(Clone)]
pub struct UserService {
    pub resolver: Resolver<UserRequest>,
    /// Calls made to the backing batch function.
    pub invocations: Arc<AtomicUsize>,
    /// Requests received across all calls.
    pub requests: Arc<AtomicUsize>,
}

impl UserService {
    /// Answers at most 15 requests per call.
    pub fn new() -> Self {
        let invocations = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));
        let (calls, seen) = (Arc::clone(&invocations), Arc::clone(&requests));

        let resolver = Resolver::batched("users", move |batch: Vec<UserRequest>| {
            calls.fetch_add(1, Ordering::SeqCst);
            seen.fetch_add(batch.len(), Ordering::SeqCst);
            async move {
                tokio::task::yield_now().await;
                Ok(batch
                    .into_iter()
                    .map(|request| match request {
                        UserRequest::GetAllIds => Ok(UserValue::Ids(user_ids())),
                        UserRequest::GetNameById(id) => user_name(id)
                            .map(UserValue::Name)
                            .ok_or_else(|| "Not Found".to_string()),
                    })
                    .collect())
            }
        })
        .batch_n(15);

        Self {
            resolver,
            invocations,
            requests,
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn get_all_user_ids(&self) -> Query<Vec<u32>, String> {
        from_request(UserRequest::GetAllIds, self.resolver.clone()).and_then(|value| match value {
            UserValue::Ids(ids) => Query::succeed(ids),
            other => Query::die(format!("unexpected answer to GetAllIds: {other:?}")),
        })
    }

    pub fn get_user_name_by_id(&self, id: u32) -> Query<String, String> {
        from_request(UserRequest::GetNameById(id), self.resolver.clone()).and_then(|value| match value {
            UserValue::Name(name) => Query::succeed(name),
            other => Query::die(format!("unexpected answer to GetNameById: {other:?}")),
        })
    }

    pub fn get_all_user_names(&self) -> Query<Vec<String>, String> {
        let service = self.clone();
        self.get_all_user_ids()
            .and_then(move |ids| Query::foreach_par(ids, move |id| service.get_user_name_by_id(id)))
    }
}

/// Context with a 100 entry, 60 second cache.
pub fn test_context() -> QueryContext {
    QueryContext::with_cache_instance(Arc::new(RequestCache::new(
        RequestCacheConfig::default()
            .with_max_capacity(100)
            .with_ttl(Duration::from_secs(60)),
    )))
}

pub fn all_user_names() -> Vec<String> {
    user_ids().into_iter().filter_map(user_name).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slow(pub u32);

impl Request for Slow {
    type Success = u32;
    type Error = String;
}

/// A resolver that holds every call until its gate opens.
pub struct GatedService {
    pub resolver: Resolver<Slow>,
    pub calls: Arc<AtomicUsize>,
    gate: watch::Sender<bool>,
}

impl GatedService {
    pub fn new() -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let (gate, _) = watch::channel(false);
        let opened = gate.subscribe();
        let counter = Arc::clone(&calls);

        let resolver = Resolver::from_fn("slow", move |Slow(n)| {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut opened = opened.clone();
            async move {
                let _ = opened.wait_for(|open| *open).await;
                Ok(n * 2)
            }
        });

        Self {
            resolver,
            calls,
            gate,
        }
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, n: u32) -> Query<u32, String> {
        from_request(Slow(n), self.resolver.clone())
    }
}

/// Yields until `condition` holds, panicking after a generous bound.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}
