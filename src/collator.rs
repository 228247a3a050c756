/*!
The collator turns a batch of examples into the tensors consumed by the model: tokenizer output
and the tag tensors of the selected strategy. Examples are independent, so the encoding can be
spread over the rayon thread pool.
*/
use crate::config::Strategy;
use crate::encoder::{AlignmentStats, EncodedExample, ExampleTags, SpanEncoder, Tag, TagEncoder};
use crate::error::{Error, Result};
use crate::example::{EntityExample, Example};
use crate::padding::{pad_batch, pad_tag_set};
use crate::tokenizer::{Encoding, Tokenize};
use ndarray::{Array2, Array3, Array4, ArrayD, Axis};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Role, head-pair and tail-pair tensors of a batch. Dense strategies give
/// `[batch, labels, max_length, max_length]`, the sparse one `[batch, labels, max_coords, 2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTags {
    pub role: Array4<Tag>,
    pub head: Array4<Tag>,
    pub tail: Array4<Tag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchTensors {
    pub input_ids: Array2<Tag>,
    pub attention_mask: Array2<Tag>,
    pub tags: BatchTags,
    pub stats: AlignmentStats,
    pub(crate) strategy: Strategy,
}

impl BatchTensors {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    /// Model input dictionary, keyed by `input_ids`, `attention_mask` and the tag keys of the
    /// strategy.
    pub fn into_map(self) -> BTreeMap<&'static str, ArrayD<Tag>> {
        let [role_key, head_key, tail_key] = self.strategy.tag_keys();
        BTreeMap::from([
            ("input_ids", self.input_ids.into_dyn()),
            ("attention_mask", self.attention_mask.into_dyn()),
            (role_key, self.tags.role.into_dyn()),
            (head_key, self.tags.head.into_dyn()),
            (tail_key, self.tags.tail.into_dyn()),
        ])
    }
}

/// Tensors of a span extraction batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanBatch {
    pub input_ids: Array2<Tag>,
    pub attention_mask: Array2<Tag>,
    /// `[batch, labels, max_length, max_length]`.
    pub label_ids: Array4<Tag>,
    pub stats: AlignmentStats,
}

impl SpanBatch {
    pub fn into_map(self) -> BTreeMap<&'static str, ArrayD<Tag>> {
        BTreeMap::from([
            ("input_ids", self.input_ids.into_dyn()),
            ("attention_mask", self.attention_mask.into_dyn()),
            ("label_ids", self.label_ids.into_dyn()),
        ])
    }
}

pub struct Collator<'v, T> {
    tokenizer: T,
    encoder: Box<dyn TagEncoder + 'v>,
    max_length: usize,
    parallel: bool,
}

impl<'v, T: Tokenize + Sync> Collator<'v, T> {
    pub fn new(tokenizer: T, encoder: Box<dyn TagEncoder + 'v>, max_length: usize) -> Self {
        Self {
            tokenizer,
            encoder,
            max_length,
            parallel: false,
        }
    }

    /// Encodes the examples of a batch on the rayon thread pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn strategy(&self) -> Strategy {
        self.encoder.strategy()
    }

    fn encode_one(&self, example: &Example) -> Result<(Encoding, EncodedExample)> {
        let encoding = tokenize(&self.tokenizer, &example.text, self.max_length)?;
        let encoded = self
            .encoder
            .encode(example, &encoding.offsets, self.max_length);
        Ok((encoding, encoded))
    }

    pub fn collate(&self, examples: &[Example]) -> Result<BatchTensors> {
        let encoded: Vec<(Encoding, EncodedExample)> = match self.parallel {
            true => examples
                .par_iter()
                .map(|ex| self.encode_one(ex))
                .collect::<Result<Vec<_>>>()?,
            false => examples
                .iter()
                .map(|ex| self.encode_one(ex))
                .collect::<Result<Vec<_>>>()?,
        };
        let (input_ids, attention_mask) =
            stack_inputs(encoded.iter().map(|(e, _)| e), self.max_length);
        let mut stats = AlignmentStats::default();
        let mut dense = Vec::with_capacity(encoded.len());
        let mut sparse = Vec::with_capacity(encoded.len());
        for (_, example) in encoded.into_iter() {
            stats += example.stats;
            match example.tags {
                ExampleTags::Dense(tags) => dense.push([tags.role, tags.head, tags.tail]),
                ExampleTags::Sparse(tags) => sparse.push([
                    pad_tag_set(&tags.role),
                    pad_tag_set(&tags.head),
                    pad_tag_set(&tags.tail),
                ]),
            }
        }
        let (role_labels, pair_labels) = self.encoder.label_axes();
        let tags = match self.strategy().is_sparse() {
            true => BatchTags {
                role: pad_batch(&column(&sparse, 0)),
                head: pad_batch(&column(&sparse, 1)),
                tail: pad_batch(&column(&sparse, 2)),
            },
            false => BatchTags {
                role: stack_dense(&column(&dense, 0), role_labels, self.max_length),
                head: stack_dense(&column(&dense, 1), pair_labels, self.max_length),
                tail: stack_dense(&column(&dense, 2), pair_labels, self.max_length),
            },
        };
        debug!(
            batch_size = input_ids.nrows(),
            roles = stats.roles,
            skipped = stats.skipped(),
            "collated batch"
        );
        Ok(BatchTensors {
            input_ids,
            attention_mask,
            tags,
            stats,
            strategy: self.strategy(),
        })
    }
}

/// Collator of span extraction batches.
pub struct SpanCollator<'v, T> {
    tokenizer: T,
    encoder: SpanEncoder<'v>,
    max_length: usize,
}

impl<'v, T: Tokenize> SpanCollator<'v, T> {
    pub fn new(tokenizer: T, encoder: SpanEncoder<'v>, max_length: usize) -> Self {
        Self {
            tokenizer,
            encoder,
            max_length,
        }
    }

    pub fn collate(&self, examples: &[EntityExample]) -> Result<SpanBatch> {
        let mut encodings = Vec::with_capacity(examples.len());
        let mut label_ids = Vec::with_capacity(examples.len());
        let mut stats = AlignmentStats::default();
        for example in examples.iter() {
            let encoding = tokenize(&self.tokenizer, &example.text, self.max_length)?;
            let (tags, example_stats) =
                self.encoder.encode(example, &encoding.offsets, self.max_length);
            stats += example_stats;
            label_ids.push(tags);
            encodings.push(encoding);
        }
        let (input_ids, attention_mask) = stack_inputs(encodings.iter(), self.max_length);
        Ok(SpanBatch {
            input_ids,
            attention_mask,
            label_ids: stack_dense(&label_ids, self.encoder.n_labels(), self.max_length),
            stats,
        })
    }
}

fn tokenize<T: Tokenize>(tokenizer: &T, text: &str, max_length: usize) -> Result<Encoding> {
    let encoding = tokenizer.encode(text, max_length)?;
    if encoding.len() != max_length || encoding.offsets.len() != max_length {
        return Err(Error::shape(
            "encoding",
            &[max_length, max_length],
            &[encoding.len(), encoding.offsets.len()],
        ));
    }
    Ok(encoding)
}

fn stack_inputs<'a, I>(encodings: I, max_length: usize) -> (Array2<Tag>, Array2<Tag>)
where
    I: ExactSizeIterator<Item = &'a Encoding>,
{
    let mut input_ids = Array2::zeros((encodings.len(), max_length));
    let mut attention_mask = Array2::zeros((encodings.len(), max_length));
    for (i, encoding) in encodings.enumerate() {
        for (k, (&id, &mask)) in encoding
            .input_ids
            .iter()
            .zip(encoding.attention_mask.iter())
            .enumerate()
        {
            input_ids[[i, k]] = id as Tag;
            attention_mask[[i, k]] = mask as Tag;
        }
    }
    (input_ids, attention_mask)
}

/// The `k`-th tensor (role, head or tail) of every example.
fn column(tensors: &[[Array3<Tag>; 3]], k: usize) -> Vec<Array3<Tag>> {
    tensors.iter().map(|t| t[k].clone()).collect()
}

/// Stacks `[labels, L, L]` tensors along a new batch axis. `labels` is given by the encoder so
/// that an empty batch keeps its label axis.
fn stack_dense(tensors: &[Array3<Tag>], labels: usize, max_length: usize) -> Array4<Tag> {
    let mut batch = Array4::zeros((tensors.len(), labels, max_length, max_length));
    for (i, tensor) in tensors.iter().enumerate() {
        batch.index_axis_mut(Axis(0), i).assign(tensor);
    }
    batch
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::encoder_for;
    use crate::example::test::layoff_example;
    use crate::tokenizer::CharTokenizer;
    use crate::vocab::{LabelVocabulary, Vocabularies};
    use rstest::rstest;

    const MAX_LENGTH: usize = 32;

    fn build_batch() -> Vec<Example> {
        vec![
            layoff_example(),
            Example {
                text: String::from("nothing happened"),
                events: vec![],
            },
        ]
    }

    #[rstest]
    #[case(Strategy::Combined, [2, 2, 32, 32], [2, 1, 32, 32])]
    #[case(Strategy::RoleType, [2, 1, 32, 32], [2, 1, 32, 32])]
    #[case(Strategy::EntityGraph, [2, 1, 32, 32], [2, 1, 32, 32])]
    #[case(Strategy::SparseCombined, [2, 2, 1, 2], [2, 1, 1, 2])]
    fn test_collate_shapes(
        #[case] strategy: Strategy,
        #[case] role_shape: [usize; 4],
        #[case] pair_shape: [usize; 4],
    ) {
        let batch = build_batch();
        let vocabularies = Vocabularies::build(&batch);
        let tokenizer = CharTokenizer::from_texts(batch.iter().map(|ex| ex.text.as_str()));
        let collator = Collator::new(
            &tokenizer,
            encoder_for(strategy, &vocabularies, true),
            MAX_LENGTH,
        );
        let tensors = collator.collate(&batch).unwrap();
        assert_eq!(tensors.tags.role.shape(), &role_shape);
        assert_eq!(tensors.tags.head.shape(), &pair_shape);
        assert_eq!(tensors.tags.tail.shape(), &pair_shape);
        assert_eq!(tensors.input_ids.shape(), &[2, MAX_LENGTH]);
        let keys: Vec<_> = tensors.into_map().into_keys().collect();
        let [role_key, head_key, tail_key] = strategy.tag_keys();
        for key in ["input_ids", "attention_mask", role_key, head_key, tail_key] {
            assert!(keys.contains(&key));
        }
    }

    #[test]
    fn test_sparse_batch_content() {
        let batch = build_batch();
        let vocabularies = Vocabularies::build(&batch);
        let tokenizer = CharTokenizer::from_texts(batch.iter().map(|ex| ex.text.as_str()));
        let collator = Collator::new(
            &tokenizer,
            encoder_for(Strategy::SparseCombined, &vocabularies, true),
            MAX_LENGTH,
        );
        let tags = collator.collate(&batch).unwrap().tags;
        assert_eq!(tags.role[[0, 0, 0, 0]], 1);
        assert_eq!(tags.role[[0, 0, 0, 1]], 1);
        assert_eq!(tags.role[[0, 1, 0, 0]], 3);
        assert_eq!(tags.role[[0, 1, 0, 1]], 10);
        assert_eq!(tags.head[[0, 0, 0, 0]], 1);
        assert_eq!(tags.head[[0, 0, 0, 1]], 3);
        // Only sentinels for the empty example.
        assert_eq!(tags.role.index_axis(Axis(0), 1).sum(), 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut batch = build_batch();
        batch.extend(build_batch());
        batch.push(layoff_example());
        let vocabularies = Vocabularies::build(&batch);
        let tokenizer = CharTokenizer::from_texts(batch.iter().map(|ex| ex.text.as_str()));
        for strategy in Strategy::all() {
            let sequential = Collator::new(
                &tokenizer,
                encoder_for(strategy, &vocabularies, true),
                MAX_LENGTH,
            );
            let parallel = Collator::new(
                &tokenizer,
                encoder_for(strategy, &vocabularies, true),
                MAX_LENGTH,
            )
            .parallel(true);
            assert_eq!(
                sequential.collate(&batch).unwrap(),
                parallel.collate(&batch).unwrap()
            );
        }
    }

    #[test]
    fn test_empty_batch() {
        let vocabularies = Vocabularies::build(&[layoff_example()]);
        let tokenizer = CharTokenizer::from_texts(["A company"]);
        let collator = Collator::new(
            &tokenizer,
            encoder_for(Strategy::Combined, &vocabularies, true),
            MAX_LENGTH,
        );
        let tensors = collator.collate(&[]).unwrap();
        assert_eq!(tensors.batch_size(), 0);
        assert_eq!(
            tensors.tags.role.shape(),
            &[0, vocabularies.combined.len(), MAX_LENGTH, MAX_LENGTH]
        );
        assert_eq!(tensors.tags.head.shape(), &[0, 1, MAX_LENGTH, MAX_LENGTH]);
    }

    #[test]
    fn test_span_collator() {
        let entities: Vec<EntityExample> = build_batch().iter().map(EntityExample::from).collect();
        let labels = LabelVocabulary::span_labels(&entities);
        let tokenizer = CharTokenizer::from_texts(entities.iter().map(|ex| ex.text.as_str()));
        let collator = SpanCollator::new(&tokenizer, SpanEncoder::new(&labels), MAX_LENGTH);
        let batch = collator.collate(&entities).unwrap();
        assert_eq!(batch.label_ids.shape(), &[2, 2, MAX_LENGTH, MAX_LENGTH]);
        assert_eq!(batch.label_ids.sum(), 2);
        assert_eq!(batch.attention_mask.row(0).sum(), 31);
        assert!(batch.into_map().contains_key("label_ids"));
    }
}
