//! Ready-made resolver shapes and resolver combinators.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use super::{RequestResolver, Resolver};
use crate::error::Cause;
use crate::request::{Entry, Request};

/// Answers each step with one call taking every request of the step.
struct Batched<A, F> {
    f: F,
    _request: PhantomData<fn(A)>,
}

#[async_trait]
impl<A, F, Fut> RequestResolver<A> for Batched<A, F>
where
    A: Request,
    F: Fn(Vec<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Result<A::Success, A::Error>>, A::Error>> + Send + 'static,
{
    async fn run_all(&self, batches: Vec<Vec<Entry<A>>>) -> Result<(), A::Error> {
        for batch in batches {
            if batch.is_empty() {
                continue;
            }
            let requests: Vec<A> = batch.iter().map(|entry| entry.request().clone()).collect();
            let results = (self.f)(requests).await?;
            if results.len() != batch.len() {
                warn!(
                    expected = batch.len(),
                    received = results.len(),
                    "batched resolver returned a mismatched number of results"
                );
            }
            for (entry, result) in batch.iter().zip(results) {
                entry.complete(result.map_err(Cause::Fail));
            }
        }
        Ok(())
    }
}

/// Answers each request with its own call; a step's calls run concurrently.
struct FromFn<A, F> {
    f: F,
    _request: PhantomData<fn(A)>,
}

#[async_trait]
impl<A, F, Fut> RequestResolver<A> for FromFn<A, F>
where
    A: Request,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A::Success, A::Error>> + Send + 'static,
{
    async fn run_all(&self, batches: Vec<Vec<Entry<A>>>) -> Result<(), A::Error> {
        for batch in batches {
            let results = join_all(batch.iter().map(|entry| (self.f)(entry.request().clone()))).await;
            for (entry, result) in batch.iter().zip(results) {
                entry.complete(result.map_err(Cause::Fail));
            }
        }
        Ok(())
    }
}

/// Splits every step into chunks of at most `limit` entries.
struct BatchN<A: Request> {
    inner: Arc<dyn RequestResolver<A>>,
    limit: usize,
}

#[async_trait]
impl<A: Request> RequestResolver<A> for BatchN<A> {
    async fn run_all(&self, batches: Vec<Vec<Entry<A>>>) -> Result<(), A::Error> {
        let chunked: Vec<Vec<Entry<A>>> = batches
            .iter()
            .flat_map(|batch| batch.chunks(self.limit).map(<[Entry<A>]>::to_vec))
            .collect();
        self.inner.run_all(chunked).await
    }
}

impl<A: Request> Resolver<A> {
    /// Builds a resolver from a function answering a whole step at once.
    ///
    /// Results are matched to requests by position. Returning `Err` fails
    /// every open request of the run; requests without a matching result are
    /// completed as defects.
    pub fn batched<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Result<A::Success, A::Error>>, A::Error>> + Send + 'static,
    {
        Self::new(
            name,
            Batched {
                f,
                _request: PhantomData,
            },
        )
    }

    /// Builds a resolver from a function answering one request at a time.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A::Success, A::Error>> + Send + 'static,
    {
        Self::new(
            name,
            FromFn {
                f,
                _request: PhantomData,
            },
        )
    }

    /// Returns a resolver that never sends more than `limit` requests in one
    /// round trip. The result has its own identity.
    pub fn batch_n(&self, limit: usize) -> Self {
        Self::from_arc(
            format!("{}.batch_n({limit})", self.name),
            Arc::new(BatchN {
                inner: Arc::clone(&self.inner),
                limit: limit.max(1),
            }),
        )
    }
}
