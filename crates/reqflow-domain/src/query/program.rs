//! Untyped query programs: a head step plus a stack of continuations.
//!
//! `and_then` and its relatives push onto the stack instead of wrapping the
//! query they extend, so a chain built in a loop stays flat. Stepping only
//! ever touches the head; when it finishes, the top continuation is popped
//! and its program spliced in.

use std::any::Any;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::block::RequestBlock;
use crate::error::{Cause, Exit};

use super::QueryContext;

pub(super) type Value = Box<dyn Any + Send>;

/// A finished program: `Ok` holds the value, `Err` holds a `Cause<E>`.
pub(super) type ErasedExit = Result<Value, Value>;

pub(super) type StepFn = Box<dyn FnOnce(QueryContext) -> BoxFuture<'static, ErasedStep> + Send>;

pub(super) type Continuation = Box<dyn FnOnce(ErasedExit) -> Program + Send>;

pub(super) enum ErasedStep {
    Done(ErasedExit),
    Blocked(RequestBlock, Program),
}

pub(super) enum Head {
    Exit(ErasedExit),
    Step(StepFn),
}

pub(super) struct Program {
    head: Head,
    /// Applied last-in first-out.
    continuations: Vec<Continuation>,
}

impl Program {
    pub(super) fn exit(exit: ErasedExit) -> Self {
        Self {
            head: Head::Exit(exit),
            continuations: Vec::new(),
        }
    }

    pub(super) fn from_step(step: StepFn) -> Self {
        Self {
            head: Head::Step(step),
            continuations: Vec::new(),
        }
    }

    pub(super) fn push(mut self, continuation: Continuation) -> Self {
        self.continuations.push(continuation);
        self
    }

    /// Runs the head and pops continuations until something blocks or the
    /// stack is empty.
    pub(super) fn step(self, ctx: QueryContext) -> BoxFuture<'static, ErasedStep> {
        async move {
            let Program {
                mut head,
                mut continuations,
            } = self;
            loop {
                let exit = match head {
                    Head::Exit(exit) => exit,
                    Head::Step(step) => match step(ctx.clone()).await {
                        ErasedStep::Done(exit) => exit,
                        ErasedStep::Blocked(block, next) => {
                            continuations.extend(next.continuations);
                            let next = Program {
                                head: next.head,
                                continuations,
                            };
                            return ErasedStep::Blocked(block, next);
                        }
                    },
                };

                let Some(continuation) = continuations.pop() else {
                    return ErasedStep::Done(exit);
                };
                let next = continuation(exit);
                head = next.head;
                continuations.extend(next.continuations);
            }
        }
        .boxed()
    }
}

pub(super) fn erase_exit<A, E>(exit: Exit<A, E>) -> ErasedExit
where
    A: Send + 'static,
    E: Send + 'static,
{
    match exit {
        Ok(value) => Ok(Box::new(value)),
        Err(cause) => Err(Box::new(cause)),
    }
}

/// Recovers the typed exit. The typed `Query` wrapper guarantees the types
/// line up; a mismatch surfaces as a defect rather than a panic.
pub(super) fn restore_exit<A, E>(exit: ErasedExit) -> Exit<A, E>
where
    A: 'static,
    E: 'static,
{
    match exit {
        Ok(value) => match value.downcast::<A>() {
            Ok(value) => Ok(*value),
            Err(_) => Err(Cause::die("query value has an unexpected type")),
        },
        Err(cause) => match cause.downcast::<Cause<E>>() {
            Ok(cause) => Err(*cause),
            Err(_) => Err(Cause::die("query failure has an unexpected type")),
        },
    }
}
