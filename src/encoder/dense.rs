//! The three dense strategies. Tensors are square in the token dimension and hold `1` on every
//! marked cell.
use super::{walk_events, DenseTags, EncodedExample, ExampleTags, TagEncoder, TagSink};
use crate::config::Strategy;
use crate::example::{Event, Example};
use crate::offsets::TokenOffsetMap;
use crate::vocab::{CombinedLabel, LabelVocabulary};

/// Looks up `(event, role)` in the combined vocabulary.
pub(crate) fn combined_slot(
    vocab: &LabelVocabulary<CombinedLabel>,
    event: &Event,
    role_label: &str,
) -> Option<usize> {
    vocab.id(&CombinedLabel::new(event.label.as_str(), role_label))
}

/// Role tensor over the combined vocabulary, head and tail tensors over a single global axis.
///
/// A `("Layoff", "Employer")` role spanning tokens 1..=1 sets `role[[id, 1, 1]]`, and its pair
/// with a trigger on tokens 3..=4 sets `head[[0, 1, 3]]` and `tail[[0, 1, 4]]`.
#[derive(Debug, Clone, Copy)]
pub struct CombinedEncoder<'v> {
    vocab: &'v LabelVocabulary<CombinedLabel>,
}

impl<'v> CombinedEncoder<'v> {
    pub fn new(vocab: &'v LabelVocabulary<CombinedLabel>) -> Self {
        Self { vocab }
    }
}

struct CombinedSink<'v> {
    vocab: &'v LabelVocabulary<CombinedLabel>,
    tags: DenseTags,
}

impl<'v> TagSink for CombinedSink<'v> {
    fn role_slot(&self, event: &Event, role_label: &str) -> Option<usize> {
        combined_slot(self.vocab, event, role_label)
    }
    fn pair_slot(&self, _event: &Event) -> Option<usize> {
        Some(0)
    }
    fn mark_role(&mut self, slot: usize, head: usize, tail: usize) {
        self.tags.role[[slot, head, tail]] = 1;
    }
    fn mark_pair(&mut self, slot: usize, heads: (usize, usize), tails: (usize, usize)) {
        self.tags.head[[slot, heads.0, heads.1]] = 1;
        self.tags.tail[[slot, tails.0, tails.1]] = 1;
    }
}

impl<'v> TagEncoder for CombinedEncoder<'v> {
    fn strategy(&self) -> Strategy {
        Strategy::Combined
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
        let mut sink = CombinedSink {
            vocab: self.vocab,
            tags: DenseTags::zeros(self.vocab.len(), 1, max_length),
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
            tags: ExampleTags::Dense(sink.tags),
            stats,
        }
    }
}

/// Every tensor is indexed by event type. Roles, the `<event>-trigger` role included, are marked
/// in the slice of their event type.
#[derive(Debug, Clone, Copy)]
pub struct RoleTypeEncoder<'v> {
    event_types: &'v LabelVocabulary<String>,
}

impl<'v> RoleTypeEncoder<'v> {
    pub fn new(event_types: &'v LabelVocabulary<String>) -> Self {
        Self { event_types }
    }
}

/// Sink whose role and pair slots are both the id of the event type. The directed flag only
/// changes the walk, not the sink.
struct EventTypeSink<'v> {
    event_types: &'v LabelVocabulary<String>,
    tags: DenseTags,
    single_role_axis: bool,
}

impl<'v> TagSink for EventTypeSink<'v> {
    fn role_slot(&self, event: &Event, _role_label: &str) -> Option<usize> {
        match self.single_role_axis {
            true => Some(0),
            false => self.event_types.id(event.label.as_str()),
        }
    }
    fn pair_slot(&self, event: &Event) -> Option<usize> {
        self.event_types.id(event.label.as_str())
    }
    fn mark_role(&mut self, slot: usize, head: usize, tail: usize) {
        self.tags.role[[slot, head, tail]] = 1;
    }
    fn mark_pair(&mut self, slot: usize, heads: (usize, usize), tails: (usize, usize)) {
        self.tags.head[[slot, heads.0, heads.1]] = 1;
        self.tags.tail[[slot, tails.0, tails.1]] = 1;
    }
}

impl<'v> TagEncoder for RoleTypeEncoder<'v> {
    fn strategy(&self) -> Strategy {
        Strategy::RoleType
    }

    fn label_axes(&self) -> (usize, usize) {
        (self.event_types.len(), self.event_types.len())
    }

    fn encode(
        &self,
        example: &Example,
        offsets: &TokenOffsetMap,
        max_length: usize,
    ) -> EncodedExample {
        let (role_labels, pair_labels) = self.label_axes();
        let mut sink = EventTypeSink {
            event_types: self.event_types,
            tags: DenseTags::zeros(role_labels, pair_labels, max_length),
            single_role_axis: false,
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
            tags: ExampleTags::Dense(sink.tags),
            stats,
        }
    }
}

/// Roles are marked on a single axis, as untyped entities. Heads and tails of every ordered pair
/// of roles of an event are linked in the slice of its event type, which makes the head and tail
/// tensors directed graphs between entities.
#[derive(Debug, Clone, Copy)]
pub struct EntityGraphEncoder<'v> {
    event_types: &'v LabelVocabulary<String>,
}

impl<'v> EntityGraphEncoder<'v> {
    pub fn new(event_types: &'v LabelVocabulary<String>) -> Self {
        Self { event_types }
    }
}

impl<'v> TagEncoder for EntityGraphEncoder<'v> {
    fn strategy(&self) -> Strategy {
        Strategy::EntityGraph
    }

    fn label_axes(&self) -> (usize, usize) {
        (1, self.event_types.len())
    }

    fn encode(
        &self,
        example: &Example,
        offsets: &TokenOffsetMap,
        max_length: usize,
    ) -> EncodedExample {
        let mut sink = EventTypeSink {
            event_types: self.event_types,
            tags: DenseTags::zeros(1, self.event_types.len(), max_length),
            single_role_axis: true,
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
            tags: ExampleTags::Dense(sink.tags),
            stats,
        }
    }
}
