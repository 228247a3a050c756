use super::{AlignmentStats, Tag};
use crate::example::EntityExample;
use crate::offsets::TokenOffsetMap;
use crate::vocab::LabelVocabulary;
use ndarray::Array3;
use tracing::warn;

/// Encoder of span extraction examples. Every entity marks `[label, head, tail]` of a single
/// `label_ids` tensor, nested and overlapping entities included.
#[derive(Debug, Clone, Copy)]
pub struct SpanEncoder<'v> {
    labels: &'v LabelVocabulary<String>,
}

impl<'v> SpanEncoder<'v> {
    /// `labels` is usually `LabelVocabulary::span_labels`, or `Vocabularies::entities` for
    /// examples flattened from events.
    pub fn new(labels: &'v LabelVocabulary<String>) -> Self {
        Self { labels }
    }

    pub fn n_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn encode(
        &self,
        example: &EntityExample,
        offsets: &TokenOffsetMap,
        max_length: usize,
    ) -> (Array3<Tag>, AlignmentStats) {
        let mut label_ids = Array3::zeros((self.labels.len(), max_length, max_length));
        let mut stats = AlignmentStats::default();
        for entity in example.entities.iter() {
            stats.roles += 1;
            let Some(label) = self.labels.id(entity.label.as_str()) else {
                stats.unknown_labels += 1;
                warn!(
                    "entity label {} is not in the vocabulary, skipping {}",
                    entity.label, entity.text
                );
                continue;
            };
            match offsets.align_span(entity.offset) {
                Ok((head, tail)) if head < max_length && tail < max_length => {
                    label_ids[[label, head, tail]] = 1;
                }
                _ => {
                    stats.misaligned += 1;
                    warn!(
                        "entity {} offset {} align to token offset failed in \n\t {}",
                        entity.text, entity.offset, example.text
                    );
                }
            }
        }
        (label_ids, stats)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::example::test::layoff_example;
    use crate::example::{Role, Span};
    use crate::tokenizer::{CharTokenizer, Tokenize};
    use crate::vocab::Vocabularies;

    fn entity(label: &str, start: usize, end: usize) -> Role {
        Role {
            label: String::from(label),
            offset: Span::new(start, end),
            text: String::new(),
        }
    }

    #[test]
    fn test_nested_entities() {
        let example = EntityExample {
            text: String::from("Bank of China"),
            entities: vec![entity("ORG", 0, 13), entity("LOC", 8, 13), entity("ORG", 0, 4)],
        };
        let labels = LabelVocabulary::span_labels(&[example.clone()]);
        assert_eq!(labels.labels(), &["LOC", "ORG"]);
        let tokenizer = CharTokenizer::from_texts([example.text.as_str()]);
        let offsets = tokenizer.encode(&example.text, 20).unwrap().offsets;
        let (label_ids, stats) = SpanEncoder::new(&labels).encode(&example, &offsets, 20);
        assert_eq!(label_ids.shape(), &[2, 20, 20]);
        assert_eq!(label_ids[[0, 9, 13]], 1);
        assert_eq!(label_ids[[1, 1, 13]], 1);
        assert_eq!(label_ids[[1, 1, 4]], 1);
        assert_eq!(label_ids.sum(), 3);
        assert_eq!(stats.skipped(), 0);
    }

    #[test]
    fn test_flattened_events_use_entity_vocabulary() {
        let example = layoff_example();
        let vocabularies = Vocabularies::build(&[example.clone()]);
        let flat = EntityExample::from(&example);
        let tokenizer = CharTokenizer::from_texts([example.text.as_str()]);
        let offsets = tokenizer.encode(&example.text, 32).unwrap().offsets;
        let (label_ids, stats) =
            SpanEncoder::new(&vocabularies.entities).encode(&flat, &offsets, 32);
        // Entities: Employer, Layoff-trigger.
        assert_eq!(label_ids[[0, 1, 1]], 1);
        assert_eq!(label_ids[[1, 3, 10]], 1);
        assert_eq!(label_ids.sum(), 2);
        assert_eq!(stats.roles, 2);
    }

    #[test]
    fn test_unknown_and_truncated_entities_are_skipped() {
        let example = EntityExample {
            text: String::from("abcdefghij"),
            entities: vec![entity("A", 0, 2), entity("B", 2, 3), entity("A", 8, 10)],
        };
        let labels = LabelVocabulary::from_labels([String::from("A")]);
        let tokenizer = CharTokenizer::from_texts([example.text.as_str()]);
        let offsets = tokenizer.encode(&example.text, 6).unwrap().offsets;
        let (label_ids, stats) = SpanEncoder::new(&labels).encode(&example, &offsets, 6);
        assert_eq!(label_ids.sum(), 1);
        assert_eq!(stats.unknown_labels, 1);
        assert_eq!(stats.misaligned, 1);
    }
}
