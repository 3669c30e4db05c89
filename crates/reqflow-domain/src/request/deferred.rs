//! Single-assignment result slot.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Cause, Exit};

/// A result slot that can be completed exactly once and awaited by any
/// number of tasks.
///
/// Clones share the same slot; [`Deferred::ptr_eq`] compares slot identity.
pub struct Deferred<A, E> {
    slot: Arc<watch::Sender<Option<Exit<A, E>>>>,
}

impl<A, E> Deferred<A, E>
where
    A: Clone,
    E: Clone,
{
    /// Creates an empty slot.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Completes the slot.
    ///
    /// Returns false (and drops `exit`) if the slot was already completed.
    pub fn complete(&self, exit: Exit<A, E>) -> bool {
        self.slot.send_if_modified(move |current| {
            if current.is_some() {
                return false;
            }
            *current = Some(exit);
            true
        })
    }

    /// Returns the result if the slot is already completed.
    pub fn poll(&self) -> Option<Exit<A, E>> {
        self.slot.borrow().clone()
    }

    /// Returns true once the slot holds a result.
    pub fn is_completed(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Waits until the slot is completed and returns its result.
    pub async fn wait(&self) -> Exit<A, E> {
        let mut receiver = self.slot.subscribe();
        // The borrowed `Ref` must be released before `receiver` goes away.
        let exit = match receiver.wait_for(Option::is_some).await {
            Ok(value) => match value.as_ref() {
                Some(exit) => exit.clone(),
                None => Err(Cause::die("result slot woke up empty")),
            },
            // The sender lives inside `self`, so it cannot be gone here.
            Err(_) => Err(Cause::die("result slot closed")),
        };
        exit
    }

    /// Returns true when both handles point at the same slot.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<A: Clone, E: Clone> Default for Deferred<A, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, E> Clone for Deferred<A, E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<A, E> fmt::Debug for Deferred<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("completed", &self.slot.borrow().is_some())
            .finish()
    }
}
