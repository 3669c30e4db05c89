//! Logical requests and the entries that track them.
//!
//! A [`Request`] is a plain value describing what to fetch. Each time a query
//! issues one that is not already cached, an [`Entry`] is created: it carries
//! the request, a single-assignment [`Deferred`] result slot, and the
//! [`Listeners`] count of tasks waiting on that slot.

mod deferred;
mod entry;
mod listeners;

use std::fmt::Debug;
use std::hash::Hash;

pub use deferred::Deferred;
pub(crate) use entry::downcast_entry;
pub use entry::{AnyEntry, BlockedEntry, Entry, EntryId};
pub use listeners::{ListenerGuard, Listeners};

/// A logical request answered by a resolver.
///
/// Requests are compared by value: two structurally equal requests share one
/// cache entry.
pub trait Request: Debug + Clone + Eq + Hash + Send + Sync + 'static {
    /// Value produced when the request succeeds.
    type Success: Debug + Clone + Send + Sync + 'static;
    /// Typed failure produced when the request fails.
    type Error: Debug + Clone + Send + Sync + 'static;
}
