//! Property-based tests for the scheduler.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use crate::block::RequestBlock;
    use crate::collection::SequentialCollection;
    use crate::request::{Entry, EntryId, Request};
    use crate::resolver::Resolver;
    use crate::scheduler::flatten;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Key(u32);

    impl Request for Key {
        type Success = u32;
        type Error = String;
    }

    #[derive(Debug, Clone)]
    enum Shape {
        Empty,
        Leaf(usize),
        Par(Box<Shape>, Box<Shape>),
        Seq(Box<Shape>, Box<Shape>),
    }

    /// Trees over three resolvers, up to a few dozen nodes.
    fn shape_strategy() -> impl Strategy<Value = Shape> {
        let leaf = prop_oneof![
            1 => Just(Shape::Empty),
            4 => (0usize..3).prop_map(Shape::Leaf),
        ];
        leaf.prop_recursive(6, 48, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| Shape::Par(Box::new(l), Box::new(r))),
                (inner.clone(), inner).prop_map(|(l, r)| Shape::Seq(Box::new(l), Box::new(r))),
            ]
        })
    }

    /// A built tree, plus for every `Seq` node the entries on each side.
    struct Built {
        block: RequestBlock,
        leaves: Vec<EntryId>,
        orderings: Vec<(Vec<EntryId>, Vec<EntryId>)>,
        // Entries stay alive for the whole test.
        _entries: Vec<Entry<Key>>,
    }

    fn build(shape: &Shape, resolvers: &[Resolver<Key>]) -> Built {
        let mut entries = Vec::new();
        let mut orderings = Vec::new();
        let (block, leaves) = build_node(shape, resolvers, &mut entries, &mut orderings);
        Built {
            block,
            leaves,
            orderings,
            _entries: entries,
        }
    }

    fn build_node(
        shape: &Shape,
        resolvers: &[Resolver<Key>],
        entries: &mut Vec<Entry<Key>>,
        orderings: &mut Vec<(Vec<EntryId>, Vec<EntryId>)>,
    ) -> (RequestBlock, Vec<EntryId>) {
        match shape {
            Shape::Empty => (RequestBlock::empty(), Vec::new()),
            Shape::Leaf(r) => {
                let entry = Entry::new(Key(entries.len() as u32));
                entries.push(entry.clone());
                let id = entry.id();
                (RequestBlock::single(&resolvers[*r], entry), vec![id])
            }
            Shape::Par(l, r) => {
                let (l, mut left) = build_node(l, resolvers, entries, orderings);
                let (r, right) = build_node(r, resolvers, entries, orderings);
                left.extend(right);
                (RequestBlock::par(l, r), left)
            }
            Shape::Seq(l, r) => {
                let (l, mut left) = build_node(l, resolvers, entries, orderings);
                let (r, right) = build_node(r, resolvers, entries, orderings);
                orderings.push((left.clone(), right.clone()));
                left.extend(right);
                (RequestBlock::seq(l, r), left)
            }
        }
    }

    /// (output index, step index) of every dispatched entry.
    fn positions(outputs: &[SequentialCollection]) -> Vec<(EntryId, (usize, usize))> {
        let mut found = Vec::new();
        for (output, collection) in outputs.iter().enumerate() {
            for (_, steps) in collection.iter() {
                for (step, entries) in steps.iter().enumerate() {
                    for entry in entries {
                        found.push((entry.id(), (output, step)));
                    }
                }
            }
        }
        found
    }

    proptest! {
        #[test]
        fn test_flatten_dispatches_every_leaf_exactly_once(shape in shape_strategy()) {
            let resolvers: Vec<_> = (0..3)
                .map(|i| Resolver::<Key>::from_fn(format!("r{i}"), |Key(n)| async move { Ok(n) }))
                .collect();
            let built = build(&shape, &resolvers);
            let mut expected = built.leaves.clone();

            let outputs = flatten(built.block);
            let mut dispatched: Vec<EntryId> =
                positions(&outputs).into_iter().map(|(id, _)| id).collect();

            expected.sort();
            dispatched.sort();
            prop_assert_eq!(dispatched, expected);
        }

        #[test]
        fn test_flatten_respects_every_seq(shape in shape_strategy()) {
            let resolvers: Vec<_> = (0..3)
                .map(|i| Resolver::<Key>::from_fn(format!("r{i}"), |Key(n)| async move { Ok(n) }))
                .collect();
            let built = build(&shape, &resolvers);
            let orderings = built.orderings;

            let outputs = flatten(built.block);
            let position: HashMap<EntryId, (usize, usize)> = positions(&outputs).into_iter().collect();

            for (before, after) in &orderings {
                for first in before {
                    for second in after {
                        prop_assert!(
                            position[first] < position[second],
                            "{:?} at {:?} must precede {:?} at {:?}",
                            first, position[first], second, position[second]
                        );
                    }
                }
            }
        }

        #[test]
        fn test_multi_resolver_outputs_have_one_step(shape in shape_strategy()) {
            let resolvers: Vec<_> = (0..3)
                .map(|i| Resolver::<Key>::from_fn(format!("r{i}"), |Key(n)| async move { Ok(n) }))
                .collect();
            let built = build(&shape, &resolvers);

            for collection in flatten(built.block) {
                prop_assert!(!collection.is_empty());
                if collection.keys().len() > 1 {
                    for (_, steps) in collection.iter() {
                        prop_assert_eq!(steps.len(), 1);
                    }
                }
            }
        }
    }
}
