/*
 * This modules contains the configuration of the tagging pipeline. Most importantly, it contains
 * the `Strategy` enum, which selects one of the four tagging schemes, and the `PipelineConfig`
 * struct, which implements the default trait and can be deserialized from JSON or built with the
 * `PipelineConfigBuilder`.
*/
use crate::error::{Result, VocabularyConfigError};
use crate::example::TriggerLabel;
use either::Either as LeftOrRight;
use enum_iterator::{all, Sequence};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Sequence, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// Enumeration of the supported tagging schemes. They decide the label axis of the tag tensors
/// and which token pairs get linked.
pub enum Strategy {
    /// Dense tensors. Roles are tagged under their (event type, role type) label, head and tail
    /// pairs share a single global axis. Known as `event-role-head-tail`.
    Combined,
    /// Dense tensors, every tensor indexed by event type. Known as `role-head-tail`.
    RoleType,
    /// Dense tensors. Roles share a single axis, head and tail pairs are directed and indexed
    /// by event type. Known as `head-tail`.
    EntityGraph,
    /// Same labels as `Combined`, stored as padded coordinate lists. Known as `sparse-gplinker`.
    SparseCombined,
}

/// Which token pairs of an event get linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pairing {
    /// Every unordered pair of distinct roles, stored in the upper triangle.
    Forward,
    /// Every ordered pair of distinct roles, stored as-is.
    Directed,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Combined => "event-role-head-tail",
            Strategy::RoleType => "role-head-tail",
            Strategy::EntityGraph => "head-tail",
            Strategy::SparseCombined => "sparse-gplinker",
        }
    }

    /// Every strategy, in declaration order.
    pub fn all() -> impl Iterator<Item = Strategy> {
        all::<Strategy>()
    }

    pub fn trigger_label(&self) -> TriggerLabel {
        match self {
            Strategy::RoleType => TriggerLabel::EventScoped,
            _ => TriggerLabel::Generic,
        }
    }

    pub fn pairing(&self) -> Pairing {
        match self {
            Strategy::EntityGraph => Pairing::Directed,
            _ => Pairing::Forward,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Strategy::SparseCombined)
    }

    /// Keys of the role, head and tail tensors in the model-input dictionary.
    pub fn tag_keys(&self) -> [&'static str; 3] {
        match self {
            Strategy::EntityGraph => ["role_ids", "head_ids", "tail_ids"],
            _ => ["role_tags", "head_tags", "tail_tags"],
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Strategy {
    type Err = VocabularyConfigError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        all::<Strategy>()
            .find(|strategy| strategy.name() == s.trim())
            .ok_or_else(|| VocabularyConfigError::UnknownStrategy(String::from(s)))
    }
}

impl TryFrom<String> for Strategy {
    type Error = VocabularyConfigError;
    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Strategy::from_str(&value)
    }
}

impl From<Strategy> for String {
    fn from(value: Strategy) -> Self {
        String::from(value.name())
    }
}

/// How the maximum sequence length is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AutoLengthRepr", into = "AutoLengthRepr")]
pub enum AutoLength {
    /// Derived from the token lengths of the training split (see `length_percentile`).
    Max,
    /// Explicit length, special tokens included.
    Fixed(usize),
}

impl Default for AutoLength {
    fn default() -> Self {
        Self::Max
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AutoLengthRepr {
    Fixed(usize),
    Keyword(String),
}

impl TryFrom<AutoLengthRepr> for AutoLength {
    type Error = VocabularyConfigError;
    fn try_from(value: AutoLengthRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            AutoLengthRepr::Fixed(0) => Err(VocabularyConfigError::InvalidAutoLength(
                String::from("0"),
            )),
            AutoLengthRepr::Fixed(n) => Ok(AutoLength::Fixed(n)),
            AutoLengthRepr::Keyword(s) => AutoLength::from_str(&s),
        }
    }
}

impl From<AutoLength> for AutoLengthRepr {
    fn from(value: AutoLength) -> Self {
        match value {
            AutoLength::Max => AutoLengthRepr::Keyword(String::from("max")),
            AutoLength::Fixed(n) => AutoLengthRepr::Fixed(n),
        }
    }
}

impl FromStr for AutoLength {
    type Err = VocabularyConfigError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "max" => Ok(AutoLength::Max),
            other => match other.parse::<usize>() {
                Ok(n) if n > 0 => Ok(AutoLength::Fixed(n)),
                _ => Err(VocabularyConfigError::InvalidAutoLength(String::from(s))),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Config struct of the tagging pipeline. It implements the default trait and can be read from
/// a JSON document with `PipelineConfig::from_reader`.
pub struct PipelineConfig {
    /// The tagging scheme used to build the targets.
    pub transform: Strategy,
    /// `"max"` to derive the maximum length from the training split, or an explicit length.
    pub auto_length: AutoLength,
    /// Quantile of the training token lengths used when `auto_length` is `"max"`. `1.0` keeps
    /// the longest example.
    pub length_percentile: f64,
    /// Upper bound of the derived length. Most encoders do not accept more than 512 positions.
    pub max_length_cap: usize,
    pub batch_size: usize,
    /// Logits strictly greater than the threshold are kept when decoding.
    pub threshold: f32,
    /// Can we use multiple cores to encode the examples of a batch? Only worth it for large
    /// batches or long sequences.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transform: Strategy::Combined,
            auto_length: AutoLength::Max,
            length_percentile: 1.0,
            max_length_cap: 512,
            batch_size: 16,
            threshold: 0.0,
            parallel: false,
        }
    }
}

impl Display for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let string = format!("Transform: {}\n Auto length: {:?}\n Length percentile: {}\n Maximum length cap: {}\n Batch size: {}\n Decoding threshold: {}\n Using parallel computations: {}", self.transform, self.auto_length, self.length_percentile, self.max_length_cap, self.batch_size, self.threshold, self.parallel);
        write!(f, "{}", string)
    }
}

impl PipelineConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), VocabularyConfigError> {
        if !(0.0..=1.0).contains(&self.length_percentile) {
            return Err(VocabularyConfigError::InvalidPercentile(
                self.length_percentile,
            ));
        }
        if self.batch_size == 0 {
            return Err(VocabularyConfigError::InvalidBatchSize);
        }
        if self.max_length_cap == 0 {
            return Err(VocabularyConfigError::InvalidAutoLength(String::from(
                "max_length_cap = 0",
            )));
        }
        Ok(())
    }
}

/// This builder can be used to build and customize a `PipelineConfig` stucture.
pub struct PipelineConfigBuilder<S>
where
    S: Into<Strategy>,
{
    transform: LeftOrRight<S, Strategy>,
    auto_length: AutoLength,
    length_percentile: f64,
    max_length_cap: usize,
    batch_size: usize,
    threshold: f32,
    parallel: bool,
}

impl Default for PipelineConfigBuilder<Strategy> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> PipelineConfigBuilder<S>
where
    S: Into<Strategy>,
{
    pub fn new() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            transform: LeftOrRight::Right(defaults.transform),
            auto_length: defaults.auto_length,
            length_percentile: defaults.length_percentile,
            max_length_cap: defaults.max_length_cap,
            batch_size: defaults.batch_size,
            threshold: defaults.threshold,
            parallel: defaults.parallel,
        }
    }
    pub fn transform(mut self, transform: S) -> Self {
        self.transform = LeftOrRight::Left(transform);
        self
    }
    pub fn auto_length(mut self, auto_length: AutoLength) -> Self {
        self.auto_length = auto_length;
        self
    }
    pub fn length_percentile(mut self, length_percentile: f64) -> Self {
        self.length_percentile = length_percentile;
        self
    }
    pub fn max_length_cap(mut self, max_length_cap: usize) -> Self {
        self.max_length_cap = max_length_cap;
        self
    }
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
    pub fn build(self) -> std::result::Result<PipelineConfig, VocabularyConfigError> {
        let config = PipelineConfig {
            transform: self.transform.either_into(),
            auto_length: self.auto_length,
            length_percentile: self.length_percentile,
            max_length_cap: self.max_length_cap,
            batch_size: self.batch_size,
            threshold: self.threshold,
            parallel: self.parallel,
        };
        config.validate()?;
        Ok(config)
    }
}
