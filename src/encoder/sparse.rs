//! Sparse rendition of the combined strategy: instead of `[labels, L, L]` tensors, every label
//! keeps the set of its marked `(head, tail)` cells. Sets are ordered so that the emitted
//! coordinate lists are deterministic.
use super::dense::combined_slot;
use super::{walk_events, EncodedExample, ExampleTags, SparseTags, Tag, TagEncoder, TagSink};
use crate::config::Strategy;
use crate::example::{Event, Example};
use crate::offsets::TokenOffsetMap;
use crate::vocab::{CombinedLabel, LabelVocabulary};
use ndarray::Array3;
use std::collections::BTreeSet;

/// Cell marked in place of an empty set, so that every label emits at least one coordinate.
pub const SENTINEL: (usize, usize) = (0, 0);

/// One set of marked `(row, column)` cells per label.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SparseTagSet {
    sets: Vec<BTreeSet<(usize, usize)>>,
}

impl SparseTagSet {
    pub fn new(n_labels: usize) -> Self {
        Self {
            sets: vec![BTreeSet::new(); n_labels],
        }
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Returns false if the cell was already marked.
    ///
    /// # Panics
    /// If `label` is out of range.
    pub fn insert(&mut self, label: usize, row: usize, column: usize) -> bool {
        self.sets[label].insert((row, column))
    }

    pub fn get(&self, label: usize) -> Option<&BTreeSet<(usize, usize)>> {
        self.sets.get(label)
    }

    /// Number of marked cells, over every label.
    pub fn n_marked(&self) -> usize {
        self.sets.iter().map(|s| s.len()).sum()
    }

    /// Coordinate lists, one per label, in ascending order. Empty sets yield the sentinel cell.
    pub fn with_sentinel(&self) -> Vec<Vec<(usize, usize)>> {
        self.sets
            .iter()
            .map(|set| match set.is_empty() {
                true => vec![SENTINEL],
                false => set.iter().copied().collect(),
            })
            .collect()
    }

    /// Dense `[labels, max_length, max_length]` rendition. Cells outside of the tensor are
    /// ignored.
    pub fn to_dense(&self, max_length: usize) -> Array3<Tag> {
        let mut dense = Array3::zeros((self.sets.len(), max_length, max_length));
        for (label, set) in self.sets.iter().enumerate() {
            for &(row, column) in set.iter() {
                if let Some(cell) = dense.get_mut([label, row, column]) {
                    *cell = 1;
                }
            }
        }
        dense
    }
}

/// Combined strategy emitting sets of coordinates. Only used for training targets, evaluation
/// batches are built with the dense `CombinedEncoder`.
#[derive(Debug, Clone, Copy)]
pub struct SparseCombinedEncoder<'v> {
    vocab: &'v LabelVocabulary<CombinedLabel>,
}

impl<'v> SparseCombinedEncoder<'v> {
    pub fn new(vocab: &'v LabelVocabulary<CombinedLabel>) -> Self {
        Self { vocab }
    }
}

struct SparseSink<'v> {
    vocab: &'v LabelVocabulary<CombinedLabel>,
    tags: SparseTags,
}

impl<'v> TagSink for SparseSink<'v> {
    fn role_slot(&self, event: &Event, role_label: &str) -> Option<usize> {
        combined_slot(self.vocab, event, role_label)
    }
    fn pair_slot(&self, _event: &Event) -> Option<usize> {
        Some(0)
    }
    fn mark_role(&mut self, slot: usize, head: usize, tail: usize) {
        self.tags.role.insert(slot, head, tail);
    }
    fn mark_pair(&mut self, slot: usize, heads: (usize, usize), tails: (usize, usize)) {
        self.tags.head.insert(slot, heads.0, heads.1);
        self.tags.tail.insert(slot, tails.0, tails.1);
    }
}

impl<'v> TagEncoder for SparseCombinedEncoder<'v> {
    fn strategy(&self) -> Strategy {
        Strategy::SparseCombined
    }

    fn label_axes(&self) -> (usize, usize) {
        (self.vocab.len(), 1)
    }

    fn encode(
        &self,
        example: &Example,
        offsets: &TokenOffsetMap,
        max_length: usize,
    ) -> EncodedExample {
        let mut sink = SparseSink {
            vocab: self.vocab,
            tags: SparseTags {
                role: SparseTagSet::new(self.vocab.len()),
                head: SparseTagSet::new(1),
                tail: SparseTagSet::new(1),
            },
        };
        let strategy = self.strategy();
        let stats = walk_events(
            example,
            offsets,
            max_length,
            strategy.trigger_label(),
            strategy.pairing(),
            &mut sink,
        );
        EncodedExample {
            tags: ExampleTags::Sparse(sink.tags),
            stats,
        }
    }
}
