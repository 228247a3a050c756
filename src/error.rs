/*!
Error types of the crate. Alignment failures are local and recoverable: the encoders skip the
offending role and keep going. Configuration errors are raised at setup time and should stop
the program.
*/
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A character index could not be mapped onto a token. This happens when the span was cut by
/// truncation, when it points at a special or padding token, or when the tokenizer normalized
/// the text and shifted the offsets.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[error("character index {char_index} is not covered by any token")]
pub struct AlignmentError {
    pub char_index: usize,
}

/// Invalid configuration. These are user errors and are returned before any encoding starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VocabularyConfigError {
    #[error("unknown transform `{0}`, available transforms: event-role-head-tail, role-head-tail, head-tail, sparse-gplinker")]
    UnknownStrategy(String),
    #[error("invalid auto length `{0}`, expected `max` or a positive integer")]
    InvalidAutoLength(String),
    #[error("length percentile must be in [0, 1], got {0}")]
    InvalidPercentile(f64),
    #[error("the batch size must be greater than 0")]
    InvalidBatchSize,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Config(#[from] VocabularyConfigError),

    /// A span whose end is not greater than its start.
    #[error("invalid span [{start}, {end}): the end must be greater than the start")]
    InvalidSpan { start: usize, end: usize },

    /// Tensor dimensions that do not agree with the vocabulary or the offset map.
    #[error("shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    Shape {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The length quantile of the corpus could not be computed.
    #[error(transparent)]
    Quantile(#[from] ndarray_stats::errors::QuantileError),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn shape(name: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Error::Shape {
            name,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
