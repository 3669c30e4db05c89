//! Folding request blocks.

use std::sync::Arc;

use super::RequestBlock;
use crate::request::BlockedEntry;
use crate::resolver::DataSource;

/// One function per node kind, used by [`RequestBlock::reduce`].
pub trait Reducer<Z> {
    fn empty_case(&mut self) -> Z;

    fn par_case(&mut self, left: Z, right: Z) -> Z;

    fn seq_case(&mut self, left: Z, right: Z) -> Z;

    fn single_case(&mut self, resolver: &Arc<dyn DataSource>, entry: &BlockedEntry) -> Z;
}

enum Frame<'a> {
    Visit(&'a RequestBlock),
    CombinePar,
    CombineSeq,
}

impl RequestBlock {
    /// Folds the tree bottom-up, left child before right child.
    ///
    /// Runs with an explicit work stack, so tree depth is bounded by memory
    /// rather than by the call stack.
    pub fn reduce<Z, R>(&self, reducer: &mut R) -> Z
    where
        R: Reducer<Z> + ?Sized,
    {
        let mut work = vec![Frame::Visit(self)];
        let mut output: Vec<Z> = Vec::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Visit(RequestBlock::Empty) => output.push(reducer.empty_case()),
                Frame::Visit(RequestBlock::Single { resolver, entry }) => {
                    output.push(reducer.single_case(resolver, entry))
                }
                Frame::Visit(RequestBlock::Par(left, right)) => {
                    work.push(Frame::CombinePar);
                    work.push(Frame::Visit(&**right));
                    work.push(Frame::Visit(&**left));
                }
                Frame::Visit(RequestBlock::Seq(left, right)) => {
                    work.push(Frame::CombineSeq);
                    work.push(Frame::Visit(&**right));
                    work.push(Frame::Visit(&**left));
                }
                Frame::CombinePar => {
                    let (left, right) = pop_pair(&mut output);
                    output.push(reducer.par_case(left, right));
                }
                Frame::CombineSeq => {
                    let (left, right) = pop_pair(&mut output);
                    output.push(reducer.seq_case(left, right));
                }
            }
        }

        match output.pop() {
            Some(result) => result,
            None => unreachable!("BUG: RequestBlock::reduce finished with an empty output stack"),
        }
    }
}

fn pop_pair<Z>(output: &mut Vec<Z>) -> (Z, Z) {
    match (output.pop(), output.pop()) {
        (Some(right), Some(left)) => (left, right),
        _ => unreachable!("BUG: RequestBlock::reduce combined with fewer than two results"),
    }
}

/// Counts `Single` leaves.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryCount;

impl Reducer<usize> for EntryCount {
    fn empty_case(&mut self) -> usize {
        0
    }

    fn par_case(&mut self, left: usize, right: usize) -> usize {
        left + right
    }

    fn seq_case(&mut self, left: usize, right: usize) -> usize {
        left + right
    }

    fn single_case(&mut self, _resolver: &Arc<dyn DataSource>, _entry: &BlockedEntry) -> usize {
        1
    }
}

/// Rebuilds a block, substituting the resolver of every leaf.
pub struct MapResolvers<F> {
    f: F,
}

impl<F> MapResolvers<F>
where
    F: FnMut(&Arc<dyn DataSource>) -> Arc<dyn DataSource>,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Reducer<RequestBlock> for MapResolvers<F>
where
    F: FnMut(&Arc<dyn DataSource>) -> Arc<dyn DataSource>,
{
    fn empty_case(&mut self) -> RequestBlock {
        RequestBlock::Empty
    }

    fn par_case(&mut self, left: RequestBlock, right: RequestBlock) -> RequestBlock {
        RequestBlock::par(left, right)
    }

    fn seq_case(&mut self, left: RequestBlock, right: RequestBlock) -> RequestBlock {
        RequestBlock::seq(left, right)
    }

    fn single_case(&mut self, resolver: &Arc<dyn DataSource>, entry: &BlockedEntry) -> RequestBlock {
        RequestBlock::Single {
            resolver: (self.f)(resolver),
            entry: Arc::clone(entry),
        }
    }
}
