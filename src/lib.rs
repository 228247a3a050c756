/*!
This library builds the supervised targets of GPLinker-style extraction models and decodes their
predictions. Annotations are character spans over raw text. They are aligned on the tokens of a
sub-word tokenizer and encoded as square `[labels, L, L]` tag tensors, where `L` is the maximum
sequence length.

# STRATEGIES
An event is decomposed into three binary tensors: the role tensor marks `(head, tail)` of every
role span, the head-pair tensor links the heads of the roles of a same event and the tail-pair
tensor links their tails. The trigger of an event is one of its roles. Four tagging schemes are
supported:
* `event-role-head-tail`: roles are labelled with their (event type, role type) pair, head and
    tail pairs share a single axis.
* `role-head-tail`: every tensor is indexed by event type.
* `head-tail`: roles are untyped entities, head and tail pairs are directed and indexed by event
    type.
* `sparse-gplinker`: same labels as `event-role-head-tail`, stored as padded coordinate lists.

Span extraction examples are encoded into a single `label_ids` tensor with the `SpanEncoder`.

# Terminology
* A span is a half-open character range `[start, end)` of the text. Offsets are counted in
    characters, not bytes.
* A vocabulary is the frozen bijection between labels and ids. It is built from the training
    split and must be shared with any inference session.
* An alignment failure happens when a span does not map onto the tokens, most often because of
    truncation. The role is skipped with a warning and the rest of the example is encoded.
*/

mod collator;
mod config;
mod datamodule;
mod decoder;
mod encoder;
mod error;
mod example;
mod offsets;
mod padding;
mod tokenizer;
mod vocab;

// The public api starts here
pub use collator::{BatchTags, BatchTensors, Collator, SpanBatch, SpanCollator};

pub use config::{AutoLength, Pairing, PipelineConfig, PipelineConfigBuilder, Strategy};

pub use datamodule::{auto_max_length, EventDataModule, Split, Splits};

pub use decoder::{
    decode_spans, DecodedArgument, DecodedEvent, DecodedSpan, EventDecoder, EventLogits,
};

pub use encoder::{
    encoder_for, AlignmentStats, CombinedEncoder, DenseTags, EncodedExample, EntityGraphEncoder,
    ExampleTags, RoleTypeEncoder, SpanEncoder, SparseCombinedEncoder, SparseTagSet, SparseTags,
    Tag, TagEncoder,
};

pub use error::{AlignmentError, Error, Result, VocabularyConfigError};

pub use example::{
    event_scoped_trigger, read_corpus, EntityExample, Event, Example, Role, RoleView, Span,
    Trigger, TriggerLabel, TRIGGER,
};

pub use offsets::TokenOffsetMap;

pub use padding::{pad_batch, pad_coordinates, pad_tag_set};

#[cfg(feature = "tokenizers")]
pub use tokenizer::HfTokenizer;
pub use tokenizer::{CharTokenizer, Encoding, Tokenize};

pub use vocab::{CombinedLabel, LabelVocabulary, OrderedLabelSet, Vocabularies};

use std::path::Path;

/// Main entrypoint of the library. It reads the `train.jsonl`, `validation.jsonl` and
/// `test.jsonl` splits of `dir` and sets up the data module: the vocabularies and the maximum
/// length are computed once, from the training split.
///
/// * `dir`: Directory holding the JSON lines splits.
/// * `tokenizer`: Tokenizer of the pretrained encoder. Its offsets must be counted in
///     characters.
/// * `config`: Pipeline configuration. See `PipelineConfigBuilder`.
pub fn data_module_from_dir<T, P>(
    dir: P,
    tokenizer: T,
    config: PipelineConfig,
) -> Result<EventDataModule<T>>
where
    T: Tokenize + Sync,
    P: AsRef<Path>,
{
    let splits = Splits::from_dir(dir)?;
    EventDataModule::setup(splits, tokenizer, config)
}
