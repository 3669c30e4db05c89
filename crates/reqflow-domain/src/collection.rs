//! Per-resolver groupings of blocked requests.
//!
//! - [`ParallelCollection`]: one batch per resolver, entries in insertion
//!   order.
//! - [`SequentialCollection`]: per resolver, an ordered list of steps to be
//!   pipelined. Different resolvers are unordered relative to each other.
//!
//! Both are keyed by [`ResolverId`] (reference identity), and both keep
//! resolvers in first-seen order so dispatch order is deterministic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::request::BlockedEntry;
use crate::resolver::{DataSource, ResolverId};

struct Groups<T> {
    groups: Vec<(Arc<dyn DataSource>, T)>,
    index: HashMap<ResolverId, usize>,
}

impl<T: Default> Groups<T> {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn slot(&mut self, resolver: &Arc<dyn DataSource>) -> &mut T {
        let position = match self.index.get(&resolver.id()) {
            Some(&position) => position,
            None => {
                self.groups.push((Arc::clone(resolver), T::default()));
                let position = self.groups.len() - 1;
                self.index.insert(resolver.id(), position);
                position
            }
        };
        &mut self.groups[position].1
    }

    fn keys(&self) -> Vec<ResolverId> {
        self.groups.iter().map(|(resolver, _)| resolver.id()).collect()
    }

    fn reindex(&mut self) {
        self.index = self
            .groups
            .iter()
            .enumerate()
            .map(|(position, (resolver, _))| (resolver.id(), position))
            .collect();
    }
}

impl<T> fmt::Debug for Groups<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.groups.iter().map(|(resolver, value)| (resolver.id(), value)))
            .finish()
    }
}

/// Entries that can be submitted together, grouped by resolver.
#[derive(Debug)]
pub struct ParallelCollection {
    groups: Groups<Vec<BlockedEntry>>,
}

impl ParallelCollection {
    pub fn empty() -> Self {
        Self {
            groups: Groups::new(),
        }
    }

    pub fn single(resolver: &Arc<dyn DataSource>, entry: BlockedEntry) -> Self {
        let mut collection = Self::empty();
        collection.push(resolver, entry);
        collection
    }

    /// Appends one entry to its resolver's batch.
    pub fn push(&mut self, resolver: &Arc<dyn DataSource>, entry: BlockedEntry) {
        self.groups.slot(resolver).push(entry);
    }

    /// Concatenates `that` onto `self`, per resolver.
    pub fn combine(mut self, that: ParallelCollection) -> Self {
        for (resolver, entries) in that.groups.groups {
            self.groups.slot(&resolver).extend(entries);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.groups.groups.is_empty()
    }

    /// Resolver identities, in first-seen order.
    pub fn keys(&self) -> Vec<ResolverId> {
        self.groups.keys()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.groups.groups.iter().map(|(_, entries)| entries.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<dyn DataSource>, &[BlockedEntry])> {
        self.groups
            .groups
            .iter()
            .map(|(resolver, entries)| (resolver, entries.as_slice()))
    }

    /// Turns each resolver's batch into a one-step pipeline.
    pub fn into_sequential(self) -> SequentialCollection {
        let groups = self
            .groups
            .groups
            .into_iter()
            .map(|(resolver, entries)| (resolver, vec![entries]))
            .collect();
        let mut groups = Groups {
            groups,
            index: HashMap::new(),
        };
        groups.reindex();
        SequentialCollection { groups }
    }
}

impl Default for ParallelCollection {
    fn default() -> Self {
        Self::empty()
    }
}

/// Ordered steps per resolver.
#[derive(Debug)]
pub struct SequentialCollection {
    groups: Groups<Vec<Vec<BlockedEntry>>>,
}

impl SequentialCollection {
    pub fn empty() -> Self {
        Self {
            groups: Groups::new(),
        }
    }

    /// Appends `that`'s steps after `self`'s, per resolver.
    pub fn combine(mut self, that: SequentialCollection) -> Self {
        for (resolver, steps) in that.groups.groups {
            self.groups.slot(&resolver).extend(steps);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.groups.groups.is_empty()
    }

    /// Resolver identities, in first-seen order.
    pub fn keys(&self) -> Vec<ResolverId> {
        self.groups.keys()
    }

    /// Total number of entries across all steps.
    pub fn len(&self) -> usize {
        self.groups
            .groups
            .iter()
            .flat_map(|(_, steps)| steps.iter())
            .map(Vec::len)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<dyn DataSource>, &[Vec<BlockedEntry>])> {
        self.groups
            .groups
            .iter()
            .map(|(resolver, steps)| (resolver, steps.as_slice()))
    }

    /// Steps addressed to one resolver, if any.
    pub fn steps(&self, resolver: ResolverId) -> Option<&[Vec<BlockedEntry>]> {
        self.groups
            .index
            .get(&resolver)
            .map(|&position| self.groups.groups[position].1.as_slice())
    }

    pub fn into_groups(self) -> Vec<(Arc<dyn DataSource>, Vec<Vec<BlockedEntry>>)> {
        self.groups.groups
    }

    /// Keeps only the entries accepted by `keep`, dropping steps and
    /// resolvers left empty.
    pub fn retain_entries<F>(&mut self, mut keep: F)
    where
        F: FnMut(&BlockedEntry) -> bool,
    {
        for (_, steps) in &mut self.groups.groups {
            for step in steps.iter_mut() {
                step.retain(|entry| keep(entry));
            }
            steps.retain(|step| !step.is_empty());
        }
        self.groups.groups.retain(|(_, steps)| !steps.is_empty());
        self.groups.reindex();
    }
}

impl Default for SequentialCollection {
    fn default() -> Self {
        Self::empty()
    }
}
