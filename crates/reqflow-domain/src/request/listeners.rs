//! Reference count of tasks waiting on one result slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Number of tasks currently awaiting an entry's result.
#[derive(Debug, Default)]
pub struct Listeners {
    count: AtomicUsize,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement(&self) {
        // Saturate instead of wrapping if a caller decrements without a
        // matching increment.
        let _ = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// RAII listener registration.
///
/// Increments on creation and decrements exactly once on drop, whether the
/// wait it covers succeeds, fails, or is cancelled.
#[derive(Debug)]
pub struct ListenerGuard {
    listeners: Arc<Listeners>,
}

impl ListenerGuard {
    pub fn new(listeners: Arc<Listeners>) -> Self {
        listeners.increment();
        Self { listeners }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.decrement();
    }
}
