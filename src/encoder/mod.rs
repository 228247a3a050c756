/*!
Tag encoders turn an annotated example into the supervised targets of the model. The four event
strategies share the same walk over the events of an example:

1. the trigger is appended to the roles of its event (see `Event::effective_roles`),
2. every role is aligned on the tokens and marked in the role tensor,
3. every pair of aligned roles of the same event is linked by its heads and by its tails.

They differ by the label axis of each tensor and by the pairing rule, which is what the
`TagSink` implementations of the `dense` and `sparse` modules decide.
*/
use crate::config::{Pairing, Strategy};
use crate::example::{Event, Example, TriggerLabel};
use crate::offsets::TokenOffsetMap;
use crate::vocab::Vocabularies;
use itertools::{iproduct, Itertools};
use ndarray::Array3;
use std::ops::AddAssign;
use tracing::warn;

mod dense;
mod sparse;
mod span;

pub use dense::{CombinedEncoder, EntityGraphEncoder, RoleTypeEncoder};
pub use sparse::{SparseCombinedEncoder, SparseTagSet};
pub use span::SpanEncoder;

/// Element type of the tag tensors.
pub type Tag = i64;

/// Counts of the roles seen while encoding, and of the ones that had to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AlignmentStats {
    /// Roles seen, triggers included.
    pub roles: usize,
    /// Roles whose span could not be aligned on the tokens.
    pub misaligned: usize,
    /// Roles whose label (or event type) is absent from the vocabulary.
    pub unknown_labels: usize,
}

impl AlignmentStats {
    pub fn skipped(&self) -> usize {
        self.misaligned + self.unknown_labels
    }

    /// Share of the roles that could not be aligned. `0.0` when no role was seen.
    pub fn failure_rate(&self) -> f64 {
        match self.roles {
            0 => 0.0,
            n => self.misaligned as f64 / n as f64,
        }
    }
}

impl AddAssign for AlignmentStats {
    fn add_assign(&mut self, rhs: Self) {
        self.roles += rhs.roles;
        self.misaligned += rhs.misaligned;
        self.unknown_labels += rhs.unknown_labels;
    }
}

/// Role, head-pair and tail-pair tensors of a single example, each shaped
/// `[labels, max_length, max_length]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseTags {
    pub role: Array3<Tag>,
    pub head: Array3<Tag>,
    pub tail: Array3<Tag>,
}

impl DenseTags {
    pub fn zeros(role_labels: usize, pair_labels: usize, max_length: usize) -> Self {
        Self {
            role: Array3::zeros((role_labels, max_length, max_length)),
            head: Array3::zeros((pair_labels, max_length, max_length)),
            tail: Array3::zeros((pair_labels, max_length, max_length)),
        }
    }
}

/// Role, head-pair and tail-pair coordinate sets of a single example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseTags {
    pub role: SparseTagSet,
    pub head: SparseTagSet,
    pub tail: SparseTagSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExampleTags {
    Dense(DenseTags),
    Sparse(SparseTags),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub tags: ExampleTags,
    pub stats: AlignmentStats,
}

/// A tagging strategy. Implementors hold a reference to the frozen vocabulary they index into
/// and are shared across worker threads.
pub trait TagEncoder: Sync {
    fn strategy(&self) -> Strategy;

    /// Sizes of the role axis and of the head/tail axes of the tags.
    fn label_axes(&self) -> (usize, usize);

    /// Encodes one example. `offsets` must hold exactly `max_length` entries.
    fn encode(&self, example: &Example, offsets: &TokenOffsetMap, max_length: usize)
        -> EncodedExample;
}

/// Builds the encoder of `strategy`. The sparse strategy only applies to training targets,
/// `training = false` falls back to its dense counterpart.
pub fn encoder_for<'v>(
    strategy: Strategy,
    vocabularies: &'v Vocabularies,
    training: bool,
) -> Box<dyn TagEncoder + 'v> {
    match strategy {
        Strategy::Combined => Box::new(CombinedEncoder::new(&vocabularies.combined)),
        Strategy::RoleType => Box::new(RoleTypeEncoder::new(&vocabularies.event_types)),
        Strategy::EntityGraph => Box::new(EntityGraphEncoder::new(&vocabularies.event_types)),
        Strategy::SparseCombined if training => {
            Box::new(SparseCombinedEncoder::new(&vocabularies.combined))
        }
        Strategy::SparseCombined => Box::new(CombinedEncoder::new(&vocabularies.combined)),
    }
}

/// Destination of the marks produced while walking the events of an example.
pub(crate) trait TagSink {
    /// Slot of the role tensor for a role of `event`, `None` if the label is unknown.
    fn role_slot(&self, event: &Event, role_label: &str) -> Option<usize>;
    /// Slot of the head and tail tensors for the pairs of `event`, `None` if its type is
    /// unknown.
    fn pair_slot(&self, event: &Event) -> Option<usize>;
    fn mark_role(&mut self, slot: usize, head: usize, tail: usize);
    fn mark_pair(&mut self, slot: usize, heads: (usize, usize), tails: (usize, usize));
}

/// The walk shared by every event strategy. Roles that cannot be aligned or whose label is
/// unknown are skipped together with the pairs they belong to.
pub(crate) fn walk_events<S: TagSink>(
    example: &Example,
    offsets: &TokenOffsetMap,
    max_length: usize,
    trigger_label: TriggerLabel,
    pairing: Pairing,
    sink: &mut S,
) -> AlignmentStats {
    let mut stats = AlignmentStats::default();
    for event in example.events.iter() {
        let pair_slot = sink.pair_slot(event);
        let mut aligned: Vec<Option<(usize, usize)>> = Vec::with_capacity(event.roles.len() + 1);
        for role in event.effective_roles(trigger_label) {
            stats.roles += 1;
            let position = match offsets.align_span(role.offset) {
                Ok((head, tail)) if head < max_length && tail < max_length => (head, tail),
                _ => {
                    stats.misaligned += 1;
                    warn!(
                        "role {} offset {} align to token offset failed in \n\t {}",
                        role.text, role.offset, example.text
                    );
                    aligned.push(None);
                    continue;
                }
            };
            let role_slot = match (sink.role_slot(event, &role.label), pair_slot) {
                (Some(slot), Some(_)) => slot,
                _ => {
                    stats.unknown_labels += 1;
                    warn!(
                        "label {} of event {} is not in the vocabulary, skipping role {}",
                        role.label, event.label, role.text
                    );
                    aligned.push(None);
                    continue;
                }
            };
            sink.mark_role(role_slot, position.0, position.1);
            aligned.push(Some(position));
        }
        let Some(pair_slot) = pair_slot else {
            continue;
        };
        let n_roles = aligned.len();
        let pairs: Box<dyn Iterator<Item = (usize, usize)>> = match pairing {
            Pairing::Forward => Box::new((0..n_roles).tuple_combinations()),
            Pairing::Directed => {
                Box::new(iproduct!(0..n_roles, 0..n_roles).filter(|(i, j)| i != j))
            }
        };
        for (i, j) in pairs {
            let (Some((head1, tail1)), Some((head2, tail2))) = (aligned[i], aligned[j]) else {
                continue;
            };
            match pairing {
                Pairing::Forward => sink.mark_pair(
                    pair_slot,
                    (head1.min(head2), head1.max(head2)),
                    (tail1.min(tail2), tail1.max(tail2)),
                ),
                Pairing::Directed => sink.mark_pair(pair_slot, (head1, head2), (tail1, tail2)),
            }
        }
    }
    stats
}
