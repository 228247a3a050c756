/*!
The data module owns the splits of a corpus and everything derived from the training split. All
of it is computed once, in `EventDataModule::setup`, and read-only afterwards: the vocabularies
and the maximum sequence length. Batches are rebuilt on every call to `batches`.
*/
use crate::collator::{BatchTensors, Collator};
use crate::config::{AutoLength, PipelineConfig, Strategy};
use crate::decoder::{DecodedEvent, EventDecoder, EventLogits};
use crate::encoder::encoder_for;
use crate::error::Result;
use crate::example::{read_corpus, Example};
use crate::tokenizer::Tokenize;
use crate::vocab::{LabelVocabulary, Vocabularies};
use enum_iterator::Sequence;
use ndarray::Array1;
use ndarray_stats::{interpolate::Higher, Quantile1dExt};
use noisy_float::types::n64;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Sequence)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    /// File name of the split in a corpus directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Split::Train => "train.jsonl",
            Split::Validation => "validation.jsonl",
            Split::Test => "test.jsonl",
        }
    }
}

impl Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splits {
    pub train: Vec<Example>,
    pub validation: Vec<Example>,
    pub test: Vec<Example>,
}

impl Splits {
    /// Reads `train.jsonl`, `validation.jsonl` and `test.jsonl` from `dir`. The training split is
    /// mandatory, a missing evaluation split is read as empty.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let read_optional = |split: Split| -> Result<Vec<Example>> {
            let path = dir.join(split.file_name());
            match path.exists() {
                true => read_corpus(path),
                false => {
                    warn!("no {} split found in {}", split, dir.display());
                    Ok(Vec::new())
                }
            }
        };
        Ok(Self {
            train: read_corpus(dir.join(Split::Train.file_name()))?,
            validation: read_optional(Split::Validation)?,
            test: read_optional(Split::Test)?,
        })
    }

    pub fn get(&self, split: Split) -> &[Example] {
        match split {
            Split::Train => &self.train,
            Split::Validation => &self.validation,
            Split::Test => &self.test,
        }
    }
}

/// Maximum sequence length, special tokens included, derived from the token lengths of
/// `examples`: the `percentile` quantile (rounded up to an observed length), capped at `cap`.
/// An empty corpus gives `cap`.
pub fn auto_max_length<T: Tokenize>(
    tokenizer: &T,
    examples: &[Example],
    percentile: f64,
    cap: usize,
) -> Result<usize> {
    if examples.is_empty() {
        warn!("empty training split, using the maximum length cap {}", cap);
        return Ok(cap);
    }
    let lengths = examples
        .iter()
        .map(|ex| tokenizer.count_tokens(&ex.text))
        .collect::<Result<Vec<usize>>>()?;
    let mut lengths = Array1::from(lengths);
    let length = lengths.quantile_mut(n64(percentile), &Higher)?;
    Ok(length.min(cap))
}

pub struct EventDataModule<T> {
    config: PipelineConfig,
    tokenizer: T,
    splits: Splits,
    vocabularies: Vocabularies,
    max_length: usize,
}

impl<T: Tokenize + Sync> EventDataModule<T> {
    /// Validates the configuration, then builds the vocabularies and the maximum length from the
    /// training split.
    pub fn setup(splits: Splits, tokenizer: T, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let vocabularies = Vocabularies::build(&splits.train);
        let max_length = match config.auto_length {
            AutoLength::Fixed(n) => n,
            AutoLength::Max => auto_max_length(
                &tokenizer,
                &splits.train,
                config.length_percentile,
                config.max_length_cap,
            )?,
        };
        info!(
            strategy = %config.transform,
            max_length,
            train = splits.train.len(),
            validation = splits.validation.len(),
            test = splits.test.len(),
            "data module ready"
        );
        Ok(Self {
            config,
            tokenizer,
            splits,
            vocabularies,
            max_length,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn vocabularies(&self) -> &Vocabularies {
        &self.vocabularies
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn splits(&self) -> &Splits {
        &self.splits
    }

    /// Collator of a split. Sparse targets are only built for the training split.
    pub fn collator(&self, split: Split) -> Collator<'_, &T> {
        let encoder = encoder_for(
            self.config.transform,
            &self.vocabularies,
            split == Split::Train,
        );
        Collator::new(&self.tokenizer, encoder, self.max_length).parallel(self.config.parallel)
    }

    /// Batches of `batch_size` examples, in corpus order. The last one may be smaller.
    pub fn batches(&self, split: Split) -> impl Iterator<Item = Result<BatchTensors>> + '_ {
        let collator = self.collator(split);
        self.splits
            .get(split)
            .chunks(self.config.batch_size)
            .map(move |chunk| collator.collate(chunk))
    }

    /// Decoder of the strategy of the module, over its vocabularies.
    pub fn decoder(&self) -> EventDecoder<'_> {
        EventDecoder::new(self.config.transform, &self.vocabularies)
    }

    /// Decodes the logits predicted for `text`, keeping the cells above the configured
    /// threshold.
    pub fn decode(&self, logits: &EventLogits<f32>, text: &str) -> Result<Vec<DecodedEvent>> {
        let encoding = self.tokenizer.encode(text, self.max_length)?;
        self.decoder().decode(logits, text, &encoding.offsets, self.config.threshold)
    }

    /// Labels of the role axis, in id order, as exported alongside a model.
    pub fn role_labels(&self) -> Vec<String> {
        match self.config.transform {
            Strategy::Combined | Strategy::SparseCombined => {
                labels_of(&self.vocabularies.combined)
            }
            Strategy::RoleType => labels_of(&self.vocabularies.event_types),
            Strategy::EntityGraph => vec![String::from("entity")],
        }
    }

    /// Labels of the head and tail axes, in id order.
    pub fn pair_labels(&self) -> Vec<String> {
        match self.config.transform {
            Strategy::Combined | Strategy::SparseCombined => vec![String::from("pair")],
            Strategy::RoleType | Strategy::EntityGraph => {
                labels_of(&self.vocabularies.event_types)
            }
        }
    }

    /// Writes `vocabularies.json` and `config.json` to `dir`. An inference session must load
    /// the same files.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        self.vocabularies.save(dir.join("vocabularies.json"))?;
        let config = serde_json::to_string_pretty(&self.config)?;
        fs::write(dir.join("config.json"), config)?;
        Ok(())
    }
}

fn labels_of<L: Display>(vocab: &LabelVocabulary<L>) -> Vec<String> {
    vocab.labels().iter().map(|l| l.to_string()).collect()
}
