//! Entries: one tracked occurrence of a request plus its result slot.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::{Deferred, Listeners, Request};
use crate::error::{Cause, Exit};

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an entry, stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry#{}", self.0)
    }
}

struct EntryInner<A: Request> {
    id: EntryId,
    request: A,
    result: Deferred<A::Success, A::Error>,
    listeners: Arc<Listeners>,
}

impl<A: Request> Drop for EntryInner<A> {
    fn drop(&mut self) {
        // Nobody can answer this entry any more (its resolver run was
        // cancelled, or the block holding it was never dispatched).
        if self.result.complete(Err(Cause::Interrupted)) {
            trace!(entry = %self.id, request = ?self.request, "entry dropped unanswered");
        }
    }
}

/// One occurrence of a request awaiting an answer.
///
/// Clones share identity and result slot. The slot is completed at most once;
/// if every clone is dropped while it is still empty, it is completed with
/// [`Cause::Interrupted`].
pub struct Entry<A: Request> {
    inner: Arc<EntryInner<A>>,
}

impl<A: Request> Entry<A> {
    /// Creates an entry with a fresh result slot and listener count.
    pub fn new(request: A) -> Self {
        Self::with_slot(request, Deferred::new(), Arc::new(Listeners::new()))
    }

    /// Creates an entry whose result slot and listeners are shared with
    /// someone else (typically a cache entry).
    pub fn with_slot(
        request: A,
        result: Deferred<A::Success, A::Error>,
        listeners: Arc<Listeners>,
    ) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                id: EntryId::next(),
                request,
                result,
                listeners,
            }),
        }
    }

    pub fn id(&self) -> EntryId {
        self.inner.id
    }

    pub fn request(&self) -> &A {
        &self.inner.request
    }

    /// The result slot awaited by the entry's listeners.
    pub fn result(&self) -> &Deferred<A::Success, A::Error> {
        &self.inner.result
    }

    pub fn listeners(&self) -> &Arc<Listeners> {
        &self.inner.listeners
    }

    /// Completes the entry. Returns false if it was already completed.
    pub fn complete(&self, exit: Exit<A::Success, A::Error>) -> bool {
        self.inner.result.complete(exit)
    }

    pub fn succeed(&self, value: A::Success) -> bool {
        self.complete(Ok(value))
    }

    pub fn fail(&self, error: A::Error) -> bool {
        self.complete(Err(Cause::Fail(error)))
    }

    pub fn is_completed(&self) -> bool {
        self.inner.result.is_completed()
    }
}

impl<A: Request> Clone for Entry<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Request> fmt::Debug for Entry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.inner.id)
            .field("request", &self.inner.request)
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Type-erased view of an [`Entry`], as stored in request blocks.
pub trait AnyEntry: fmt::Debug + Send + Sync {
    fn id(&self) -> EntryId;

    fn is_completed(&self) -> bool;

    /// Completes the entry with [`Cause::Interrupted`] if still open.
    fn interrupt(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

impl<A: Request> AnyEntry for Entry<A> {
    fn id(&self) -> EntryId {
        Entry::id(self)
    }

    fn is_completed(&self) -> bool {
        Entry::is_completed(self)
    }

    fn interrupt(&self) -> bool {
        self.complete(Err(Cause::Interrupted))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared handle to a type-erased entry.
pub type BlockedEntry = Arc<dyn AnyEntry>;

impl<A: Request> From<Entry<A>> for BlockedEntry {
    fn from(entry: Entry<A>) -> Self {
        Arc::new(entry)
    }
}

/// Recovers the typed entry behind a [`BlockedEntry`].
pub(crate) fn downcast_entry<A: Request>(entry: &BlockedEntry) -> Option<Entry<A>> {
    entry.as_any().downcast_ref::<Entry<A>>().cloned()
}
