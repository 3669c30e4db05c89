//! Queries: computations that block on requests instead of performing them.
//!
//! A [`Query`] is stepped with a [`QueryContext`]. A step either finishes
//! ([`Step::Done`]) or reports the requests it is waiting for together with
//! the rest of the computation ([`Step::Blocked`]). Combinators merge the
//! blocks of independent sub-queries (`Par`) and of ordered ones (`Seq`), so
//! by the time [`Query::run`] has to dispatch, it sees every request the
//! program can issue at that point and batches them.
//!
//! ```rust,ignore
//! let names = from_request(GetAllIds, users.clone())
//!     .and_then(move |ids| Query::foreach_par(ids, move |id| from_request(GetName(id), users.clone())));
//!
//! let names = names.run(QueryContext::new()).await?;
//! ```

mod context;
mod from_request;
mod program;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use crate::block::RequestBlock;
use crate::dispatch::run_block;
use crate::error::{Cause, Exit};
use crate::resolver::DataSource;

use program::{erase_exit, restore_exit, ErasedExit, ErasedStep, Program};

pub use context::QueryContext;
pub use from_request::{cache_request_result, from_request, request_with};

/// Result of stepping a query once.
pub enum Step<A, E> {
    /// The query finished.
    Done(Exit<A, E>),
    /// The query needs `block` answered before it can continue with the
    /// query it carries.
    Blocked(RequestBlock, Query<A, E>),
}

/// A deferred computation producing `A` or failing with `E`.
///
/// Sequential combinators (`map`, `map_err`, `and_then`, `exit`) push onto
/// a continuation stack, so each step costs the same however long the
/// chain built in front of it.
pub struct Query<A, E> {
    program: Program,
    _types: PhantomData<fn() -> (A, E)>,
}

type Resolve = Arc<dyn Fn(&Arc<dyn DataSource>) -> Arc<dyn DataSource> + Send + Sync>;

impl<A, E> Query<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn from_program(program: Program) -> Self {
        Self {
            program,
            _types: PhantomData,
        }
    }

    /// Builds a query from its step function.
    pub fn from_step<F, Fut>(f: F) -> Self
    where
        F: FnOnce(QueryContext) -> Fut + Send + 'static,
        Fut: Future<Output = Step<A, E>> + Send + 'static,
    {
        Self::from_program(Program::from_step(Box::new(move |ctx| {
            f(ctx)
                .map(|step| match step {
                    Step::Done(exit) => ErasedStep::Done(erase_exit(exit)),
                    Step::Blocked(block, next) => ErasedStep::Blocked(block, next.program),
                })
                .boxed()
        })))
    }

    pub fn done(exit: Exit<A, E>) -> Self {
        Self::from_program(Program::exit(erase_exit(exit)))
    }

    pub fn succeed(value: A) -> Self {
        Self::done(Ok(value))
    }

    pub fn fail(error: E) -> Self {
        Self::done(Err(Cause::Fail(error)))
    }

    /// A query that fails with a defect.
    pub fn die(message: impl Into<String>) -> Self {
        Self::done(Err(Cause::die(message)))
    }

    /// Lifts a future that never blocks on requests.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<A, E>> + Send + 'static,
    {
        Self::from_step(move |_| async move { Step::Done(future.await.map_err(Cause::Fail)) })
    }

    /// Runs the query until it blocks or finishes.
    pub fn step(self, ctx: QueryContext) -> BoxFuture<'static, Step<A, E>> {
        self.program
            .step(ctx)
            .map(|step| match step {
                ErasedStep::Done(exit) => Step::Done(restore_exit::<A, E>(exit)),
                ErasedStep::Blocked(block, next) => Step::Blocked(block, Query::from_program(next)),
            })
            .boxed()
    }

    fn push<B, E2>(
        self,
        continuation: impl FnOnce(ErasedExit) -> Program + Send + 'static,
    ) -> Query<B, E2> {
        Query {
            program: self.program.push(Box::new(continuation)),
            _types: PhantomData,
        }
    }

    /// Runs the query to completion, dispatching every block it reports.
    pub fn run(self, ctx: QueryContext) -> BoxFuture<'static, Exit<A, E>> {
        async move {
            let mut query = self;
            loop {
                match query.step(ctx.clone()).await {
                    Step::Done(exit) => return exit,
                    Step::Blocked(block, next) => {
                        run_block(block).await;
                        query = next;
                    }
                }
            }
        }
        .boxed()
    }

    pub fn map<B, F>(self, f: F) -> Query<B, E>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        self.push(move |exit| Program::exit(erase_exit(restore_exit::<A, E>(exit).map(f))))
    }

    pub fn map_err<E2, F>(self, f: F) -> Query<A, E2>
    where
        E2: Send + 'static,
        F: FnOnce(E) -> E2 + Send + 'static,
    {
        self.push(move |exit| {
            let exit = restore_exit::<A, E>(exit).map_err(|cause| cause.map(f));
            Program::exit(erase_exit(exit))
        })
    }

    /// Continues with a query built from this one's value.
    ///
    /// The continuation is only built once the value exists, so requests it
    /// issues are always sequenced after this query's.
    pub fn and_then<B, F>(self, f: F) -> Query<B, E>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Query<B, E> + Send + 'static,
    {
        self.push(move |exit| match restore_exit::<A, E>(exit) {
            Ok(value) => f(value).program,
            Err(cause) => Program::exit(erase_exit::<B, E>(Err(cause))),
        })
    }

    /// Captures the outcome of this query as a value.
    pub fn exit<E2>(self) -> Query<Exit<A, E>, E2>
    where
        E2: Send + 'static,
    {
        self.push(move |exit| {
            Program::exit(erase_exit::<Exit<A, E>, E2>(Ok(restore_exit::<A, E>(exit))))
        })
    }

    /// Runs `self` then `that`, in order.
    ///
    /// Both sides are stepped before anything is dispatched, so when both
    /// block their requests go out in one round as a `Seq` block.
    pub fn zip<B>(self, that: Query<B, E>) -> Query<(A, B), E>
    where
        B: Send + 'static,
    {
        Query::from_step(move |ctx| async move {
            match self.step(ctx.clone()).await {
                Step::Done(Err(cause)) => Step::Done(Err(cause)),
                Step::Done(Ok(a)) => that.map(move |b| (a, b)).step(ctx).await,
                Step::Blocked(left, next) => match that.step(ctx).await {
                    Step::Done(Ok(b)) => Step::Blocked(left, next.map(move |a| (a, b))),
                    // The left side still runs first, then the failure wins.
                    Step::Done(Err(cause)) => {
                        Step::Blocked(left, next.and_then(move |_| Query::done(Err(cause))))
                    }
                    Step::Blocked(right, rest) => {
                        Step::Blocked(RequestBlock::seq(left, right), next.zip(rest))
                    }
                },
            }
        })
    }

    /// Runs `self` and `that` concurrently.
    ///
    /// With batching on, their blocks are combined with `Par` and dispatched
    /// together. With batching off, each side runs to completion on its own.
    pub fn zip_par<B>(self, that: Query<B, E>) -> Query<(A, B), E>
    where
        B: Send + 'static,
    {
        Query::from_step(move |ctx| async move {
            if !ctx.batching() {
                let (a, b) = futures::join!(self.run(ctx.clone()), that.run(ctx));
                return Step::Done(zip_exits(a, b));
            }

            match futures::join!(self.step(ctx.clone()), that.step(ctx)) {
                (Step::Done(Err(cause)), _) | (_, Step::Done(Err(cause))) => Step::Done(Err(cause)),
                (Step::Done(Ok(a)), Step::Done(Ok(b))) => Step::Done(Ok((a, b))),
                (Step::Blocked(left, next), Step::Done(Ok(b))) => {
                    Step::Blocked(left, next.map(move |a| (a, b)))
                }
                (Step::Done(Ok(a)), Step::Blocked(right, rest)) => {
                    Step::Blocked(right, rest.map(move |b| (a, b)))
                }
                (Step::Blocked(left, next), Step::Blocked(right, rest)) => {
                    Step::Blocked(RequestBlock::par(left, right), next.zip_par(rest))
                }
            }
        })
    }

    /// Runs the queries in order and collects their values.
    ///
    /// Every query is stepped before anything is dispatched; the blocks of
    /// those that block are chained with `Seq` in input order.
    pub fn collect_all(queries: Vec<Query<A, E>>) -> Query<Vec<A>, E> {
        Query::from_step(move |ctx| async move {
            let mut block = RequestBlock::empty();
            let mut blocked = false;
            let mut slots: Vec<Slot<A, E>> = Vec::with_capacity(queries.len());

            for query in queries {
                match query.step(ctx.clone()).await {
                    Step::Done(Ok(value)) => slots.push(Slot::Ready(value)),
                    Step::Done(Err(cause)) if !blocked => return Step::Done(Err(cause)),
                    Step::Done(Err(cause)) => {
                        // Earlier queries still finish first.
                        let rest = Query::collect_all(Slot::into_queries(slots))
                            .and_then(move |_| Query::done(Err(cause)));
                        return Step::Blocked(block, rest);
                    }
                    Step::Blocked(next_block, next) => {
                        block = if blocked {
                            RequestBlock::seq(block, next_block)
                        } else {
                            next_block
                        };
                        blocked = true;
                        slots.push(Slot::Waiting(next));
                    }
                }
            }

            if blocked {
                Step::Blocked(block, Query::collect_all(Slot::into_queries(slots)))
            } else {
                Step::Done(Ok(Slot::into_values(slots)))
            }
        })
    }

    /// Runs the queries concurrently and collects their values in input
    /// order. The first failure, by position, wins.
    pub fn collect_all_par(queries: Vec<Query<A, E>>) -> Query<Vec<A>, E> {
        Query::from_step(move |ctx| async move {
            if !ctx.batching() {
                let exits = join_all(queries.into_iter().map(|q| q.run(ctx.clone()))).await;
                return Step::Done(exits.into_iter().collect());
            }

            let steps = join_all(queries.into_iter().map(|q| q.step(ctx.clone()))).await;

            let mut block = RequestBlock::empty();
            let mut blocked = false;
            let mut slots: Vec<Slot<A, E>> = Vec::with_capacity(steps.len());
            for step in steps {
                match step {
                    Step::Done(Ok(value)) => slots.push(Slot::Ready(value)),
                    Step::Done(Err(cause)) => return Step::Done(Err(cause)),
                    Step::Blocked(next_block, next) => {
                        block = if blocked {
                            RequestBlock::par(block, next_block)
                        } else {
                            next_block
                        };
                        blocked = true;
                        slots.push(Slot::Waiting(next));
                    }
                }
            }

            if !blocked {
                return Step::Done(Ok(Slot::into_values(slots)));
            }

            Step::Blocked(block, Query::collect_all_par(Slot::into_queries(slots)))
        })
    }

    /// Applies `f` to every item and runs the resulting queries concurrently.
    pub fn foreach_par<T, F>(items: impl IntoIterator<Item = T>, f: F) -> Query<Vec<A>, E>
    where
        F: FnMut(T) -> Query<A, E>,
    {
        Query::collect_all_par(items.into_iter().map(f).collect())
    }

    /// Runs this query with batching switched on or off, continuations
    /// included.
    pub fn with_batching(self, batching: bool) -> Self {
        self.scoped(Arc::new(move |ctx: QueryContext| ctx.set_batching(batching)))
    }

    /// Runs this query with caching switched on or off, continuations
    /// included.
    pub fn with_caching(self, caching: bool) -> Self {
        self.scoped(Arc::new(move |ctx: QueryContext| ctx.set_caching(caching)))
    }

    /// Runs this query against `cache`, continuations included.
    pub fn with_cache(self, cache: Arc<crate::cache::RequestCache>) -> Self {
        self.scoped(Arc::new(move |ctx: QueryContext| ctx.set_cache(Arc::clone(&cache))))
    }

    fn scoped(self, adjust: Arc<dyn Fn(QueryContext) -> QueryContext + Send + Sync>) -> Self {
        Query::from_step(move |ctx| async move {
            match self.step(adjust(ctx)).await {
                Step::Done(exit) => Step::Done(exit),
                Step::Blocked(block, next) => Step::Blocked(block, next.scoped(adjust)),
            }
        })
    }

    /// Substitutes the resolver of every request this query issues.
    pub fn map_data_sources<F>(self, f: F) -> Self
    where
        F: Fn(&Arc<dyn DataSource>) -> Arc<dyn DataSource> + Send + Sync + 'static,
    {
        self.map_resolvers_with(Arc::new(f))
    }

    fn map_resolvers_with(self, f: Resolve) -> Self {
        Query::from_step(move |ctx| async move {
            match self.step(ctx).await {
                Step::Done(exit) => Step::Done(exit),
                Step::Blocked(block, next) => {
                    let mapped = block.map_resolvers(|resolver| f(resolver));
                    Step::Blocked(mapped, next.map_resolvers_with(f))
                }
            }
        })
    }
}

enum Slot<A, E> {
    Ready(A),
    Waiting(Query<A, E>),
}

impl<A, E> Slot<A, E>
where
    A: Send + 'static,
    E: Send + 'static,
{
    fn into_queries(slots: Vec<Self>) -> Vec<Query<A, E>> {
        slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(value) => Query::succeed(value),
                Slot::Waiting(query) => query,
            })
            .collect()
    }

    /// Only called once no slot is waiting.
    fn into_values(slots: Vec<Self>) -> Vec<A> {
        slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Ready(value) => Some(value),
                Slot::Waiting(_) => None,
            })
            .collect()
    }
}

fn zip_exits<A, B, E>(a: Exit<A, E>, b: Exit<B, E>) -> Exit<(A, B), E> {
    Ok((a?, b?))
}
