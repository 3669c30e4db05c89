//! The request block algebra.
//!
//! A [`RequestBlock`] records how blocked requests were issued by a program:
//! `Par` joins requests with no dependency between them, `Seq` joins requests
//! that must be submitted in order. Blocks are immutable and share their
//! children, so rewriting during scheduling is cheap.
//!
//! Programs that issue requests in loops build trees thousands of levels
//! deep. Nothing in this module recurses on the tree: folds use an explicit
//! stack ([`RequestBlock::reduce`]) and so do `Drop` and `Debug`.

mod reducer;

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::request::{BlockedEntry, Entry, Request};
use crate::resolver::{DataSource, Resolver};

pub use reducer::{EntryCount, MapResolvers, Reducer};

/// A tree of blocked requests.
pub enum RequestBlock {
    /// No requests.
    Empty,
    /// One request addressed to one resolver.
    Single {
        resolver: Arc<dyn DataSource>,
        entry: BlockedEntry,
    },
    /// Two blocks that may be submitted in any order, or together.
    Par(Arc<RequestBlock>, Arc<RequestBlock>),
    /// Two blocks where the left must be submitted before the right.
    Seq(Arc<RequestBlock>, Arc<RequestBlock>),
}

impl RequestBlock {
    pub fn empty() -> Self {
        RequestBlock::Empty
    }

    /// A block holding one typed entry for the given resolver.
    pub fn single<A: Request>(resolver: &Resolver<A>, entry: Entry<A>) -> Self {
        RequestBlock::Single {
            resolver: resolver.data_source(),
            entry: entry.into(),
        }
    }

    /// A block holding one erased entry for the given data source.
    pub fn single_erased(resolver: Arc<dyn DataSource>, entry: BlockedEntry) -> Self {
        RequestBlock::Single { resolver, entry }
    }

    pub fn par(left: RequestBlock, right: RequestBlock) -> Self {
        RequestBlock::Par(Arc::new(left), Arc::new(right))
    }

    pub fn seq(left: RequestBlock, right: RequestBlock) -> Self {
        RequestBlock::Seq(Arc::new(left), Arc::new(right))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBlock::Empty)
    }

    /// Number of `Single` leaves in the tree.
    pub fn entry_count(&self) -> usize {
        self.reduce(&mut EntryCount)
    }

    /// Rebuilds the tree with every leaf's resolver replaced by `f`.
    pub fn map_resolvers<F>(&self, f: F) -> RequestBlock
    where
        F: FnMut(&Arc<dyn DataSource>) -> Arc<dyn DataSource>,
    {
        self.reduce(&mut MapResolvers::new(f))
    }
}

impl Default for RequestBlock {
    fn default() -> Self {
        RequestBlock::Empty
    }
}

fn shared_empty() -> Arc<RequestBlock> {
    static EMPTY: OnceLock<Arc<RequestBlock>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(RequestBlock::Empty)))
}

fn detach_children(block: &mut RequestBlock, stack: &mut Vec<Arc<RequestBlock>>) {
    if let RequestBlock::Par(left, right) | RequestBlock::Seq(left, right) = block {
        stack.push(std::mem::replace(left, shared_empty()));
        stack.push(std::mem::replace(right, shared_empty()));
    }
}

impl Drop for RequestBlock {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        detach_children(self, &mut stack);
        while let Some(child) = stack.pop() {
            // Only descend into nodes this tree owns outright; shared nodes
            // are dropped by their last owner.
            if let Ok(mut node) = Arc::try_unwrap(child) {
                detach_children(&mut node, &mut stack);
            }
        }
    }
}

impl fmt::Debug for RequestBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Item<'a> {
            Node(&'a RequestBlock),
            Text(&'static str),
        }

        let mut stack = vec![Item::Node(self)];
        while let Some(item) = stack.pop() {
            match item {
                Item::Text(text) => f.write_str(text)?,
                Item::Node(RequestBlock::Empty) => f.write_str("Empty")?,
                Item::Node(RequestBlock::Single { resolver, entry }) => write!(
                    f,
                    "Single {{ resolver: {:?}, entry: {:?} }}",
                    resolver.id(),
                    entry.id()
                )?,
                Item::Node(RequestBlock::Par(left, right)) => {
                    f.write_str("Par(")?;
                    stack.extend([Item::Text(")"), Item::Node(right), Item::Text(", "), Item::Node(left)]);
                }
                Item::Node(RequestBlock::Seq(left, right)) => {
                    f.write_str("Seq(")?;
                    stack.extend([Item::Text(")"), Item::Node(right), Item::Text(", "), Item::Node(left)]);
                }
            }
        }
        Ok(())
    }
}
