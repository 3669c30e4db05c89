//! Turning request blocks into ordered, dispatchable batches.
//!
//! [`flatten`] repeatedly [`step`]s over a frontier of blocks. Each step
//! gathers every request that can be submitted right now into one
//! [`ParallelCollection`] and returns the sequential tails that must wait for
//! it. The tails form the next frontier. Consecutive batches addressed to the
//! same single resolver are [`merge`]d into one pipelined run.
//!
//! The `Seq(Par(a, b), r)` rewrite shares `r` between both branches, so a
//! tail can be reached more than once. Each entry is kept only in the last
//! batch that reaches it, which is the batch that respects every ordering
//! constraint on it.

#[cfg(test)]
mod scheduler_proptest;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::block::RequestBlock;
use crate::collection::{ParallelCollection, SequentialCollection};
use crate::request::EntryId;

/// Gathers everything in `block` that can run now.
///
/// Returns the batch and the tails sequenced after it.
pub fn step(block: &Arc<RequestBlock>) -> (ParallelCollection, Vec<Arc<RequestBlock>>) {
    step_frontier(vec![Arc::clone(block)])
}

/// Like [`step`], over several blocks with no ordering between them.
pub fn step_frontier(
    frontier: Vec<Arc<RequestBlock>>,
) -> (ParallelCollection, Vec<Arc<RequestBlock>>) {
    let mut parallel = ParallelCollection::empty();
    let mut tails: Vec<Arc<RequestBlock>> = Vec::new();
    let mut seen_tails: HashSet<*const RequestBlock> = HashSet::new();

    let mut stack = frontier;
    stack.reverse();

    while let Some(node) = stack.pop() {
        match &*node {
            RequestBlock::Empty => {}
            RequestBlock::Single { resolver, entry } => parallel.push(resolver, Arc::clone(entry)),
            RequestBlock::Par(left, right) => {
                stack.push(Arc::clone(right));
                stack.push(Arc::clone(left));
            }
            RequestBlock::Seq(left, right) => match &**left {
                RequestBlock::Empty => stack.push(Arc::clone(right)),
                RequestBlock::Par(a, b) => {
                    stack.push(Arc::new(RequestBlock::Seq(Arc::clone(b), Arc::clone(right))));
                    stack.push(Arc::new(RequestBlock::Seq(Arc::clone(a), Arc::clone(right))));
                }
                RequestBlock::Seq(a, b) => {
                    let rest = Arc::new(RequestBlock::Seq(Arc::clone(b), Arc::clone(right)));
                    stack.push(Arc::new(RequestBlock::Seq(Arc::clone(a), rest)));
                }
                RequestBlock::Single { resolver, entry } => {
                    parallel.push(resolver, Arc::clone(entry));
                    // Both branches of a distributed `Par` push the same tail.
                    if !right.is_empty() && seen_tails.insert(Arc::as_ptr(right)) {
                        tails.push(Arc::clone(right));
                    }
                }
            },
        }
    }

    (parallel, tails)
}

/// Converts a block into batches in submission order.
///
/// Every `Single` leaf of `block` appears in exactly one batch, and every
/// `Seq(l, r)` has all of `l` submitted strictly before any of `r`.
pub fn flatten(block: RequestBlock) -> Vec<SequentialCollection> {
    let mut batches: Vec<SequentialCollection> = Vec::new();
    let mut frontier = vec![Arc::new(block)];

    loop {
        let (parallel, tails) = step_frontier(frontier);
        if !parallel.is_empty() {
            batches.push(parallel.into_sequential());
        }
        if tails.is_empty() {
            break;
        }
        frontier = tails;
    }

    keep_last_occurrence(&mut batches);

    let mut outputs = Vec::with_capacity(batches.len());
    for batch in batches {
        merge(&mut outputs, batch);
    }
    outputs
}

/// Adds `batch` after `outputs`.
///
/// When the most recent output and `batch` are both addressed to exactly one
/// resolver, and it is the same one, `batch` becomes an extra pipelined step
/// of that output. Anything else, partial overlap included, starts a new
/// output.
pub fn merge(outputs: &mut Vec<SequentialCollection>, batch: SequentialCollection) {
    if batch.is_empty() {
        return;
    }
    match outputs.last_mut() {
        Some(last) if same_single_resolver(last, &batch) => {
            let previous = std::mem::take(last);
            *last = previous.combine(batch);
        }
        _ => outputs.push(batch),
    }
}

fn same_single_resolver(left: &SequentialCollection, right: &SequentialCollection) -> bool {
    let (left, right) = (left.keys(), right.keys());
    left.len() == 1 && right.len() == 1 && left[0] == right[0]
}

fn keep_last_occurrence(batches: &mut Vec<SequentialCollection>) {
    let mut last: HashMap<EntryId, usize> = HashMap::new();
    let mut position = 0usize;
    for batch in batches.iter() {
        for (_, steps) in batch.iter() {
            for entry in steps.iter().flatten() {
                last.insert(entry.id(), position);
                position += 1;
            }
        }
    }

    if last.len() == position {
        return;
    }

    // `retain_entries` visits entries in the same order as above.
    let mut position = 0usize;
    for batch in batches.iter_mut() {
        batch.retain_entries(|entry| {
            let keep = last.get(&entry.id()) == Some(&position);
            position += 1;
            keep
        });
    }
    batches.retain(|batch| !batch.is_empty());
}
