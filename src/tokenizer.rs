/*!
The tokenizer is an external collaborator. This module only defines what the encoders need from
it, a character-level tokenizer usable out of the box and, behind the `tokenizers` feature, an
adapter for HuggingFace tokenizers.
*/
use crate::error::Result;
use crate::offsets::TokenOffsetMap;
use ahash::{AHashMap, RandomState};

/// Output of a tokenizer for a single text, padded and truncated to `max_length`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Encoding {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    /// Character range of each token. Special and padding tokens are `(0, 0)`.
    pub offsets: TokenOffsetMap,
}

impl Encoding {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

pub trait Tokenize {
    /// Tokenizes `text`, truncating and padding the result to exactly `max_length` tokens.
    /// Offsets must be expressed in characters.
    fn encode(&self, text: &str, max_length: usize) -> Result<Encoding>;

    /// Number of tokens of `text`, special tokens included, before truncation.
    fn count_tokens(&self, text: &str) -> Result<usize>;
}

impl<T: Tokenize + ?Sized> Tokenize for &T {
    fn encode(&self, text: &str, max_length: usize) -> Result<Encoding> {
        (**self).encode(text, max_length)
    }
    fn count_tokens(&self, text: &str) -> Result<usize> {
        (**self).count_tokens(text)
    }
}

/// One token per character, whitespace included, wrapped in `[CLS]` and `[SEP]`. This mirrors
/// the character-level vocabularies of Chinese BERT models, for which every annotated span lies
/// on token boundaries.
#[derive(Debug, Clone)]
pub struct CharTokenizer {
    vocab: AHashMap<char, u32>,
}

impl CharTokenizer {
    pub const PAD_ID: u32 = 0;
    pub const UNK_ID: u32 = 1;
    pub const CLS_ID: u32 = 2;
    pub const SEP_ID: u32 = 3;
    const N_RESERVED: u32 = 4;

    /// Builds the vocabulary from the characters of `texts`, in first-seen order.
    pub fn from_texts<'a, I>(texts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut vocab: AHashMap<char, u32> = AHashMap::with_hasher(RandomState::new());
        for c in texts.into_iter().flat_map(|t| t.chars()) {
            let next_id = Self::N_RESERVED + vocab.len() as u32;
            vocab.entry(c).or_insert(next_id);
        }
        Self { vocab }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len() + Self::N_RESERVED as usize
    }

    fn token_id(&self, c: char) -> u32 {
        self.vocab.get(&c).copied().unwrap_or(Self::UNK_ID)
    }
}

impl Tokenize for CharTokenizer {
    fn encode(&self, text: &str, max_length: usize) -> Result<Encoding> {
        let budget = max_length.saturating_sub(2);
        let mut input_ids = Vec::with_capacity(max_length);
        let mut offsets = Vec::with_capacity(max_length);
        input_ids.push(Self::CLS_ID);
        offsets.push((0, 0));
        for (i, c) in text.chars().take(budget).enumerate() {
            input_ids.push(self.token_id(c));
            offsets.push((i, i + 1));
        }
        input_ids.push(Self::SEP_ID);
        offsets.push((0, 0));
        input_ids.truncate(max_length);
        offsets.truncate(max_length);
        let mut attention_mask = vec![1; input_ids.len()];
        input_ids.resize(max_length, Self::PAD_ID);
        attention_mask.resize(max_length, 0);
        offsets.resize(max_length, (0, 0));
        Ok(Encoding {
            input_ids,
            attention_mask,
            offsets: TokenOffsetMap::new(offsets),
        })
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.chars().count() + 2)
    }
}

#[cfg(feature = "tokenizers")]
pub use hf::HfTokenizer;

#[cfg(feature = "tokenizers")]
mod hf {
    use super::{Encoding, Tokenize};
    use crate::error::{Error, Result};
    use crate::offsets::TokenOffsetMap;
    use std::path::Path;
    use tokenizers::{PaddingDirection, PostProcessor, Tokenizer, TruncationDirection};

    /// Adapter around a HuggingFace tokenizer. Offsets are requested in characters.
    pub struct HfTokenizer {
        inner: Tokenizer,
        pad_id: u32,
        pad_token: String,
    }

    impl HfTokenizer {
        pub fn new(inner: Tokenizer) -> Self {
            let (pad_id, pad_token) = match inner.get_padding() {
                Some(params) => (params.pad_id, params.pad_token.clone()),
                None => (
                    inner.token_to_id("[PAD]").unwrap_or(0),
                    String::from("[PAD]"),
                ),
            };
            Self {
                inner,
                pad_id,
                pad_token,
            }
        }

        pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
            let inner = Tokenizer::from_file(path).map_err(|e| Error::Tokenizer(e.to_string()))?;
            Ok(Self::new(inner))
        }

        fn n_special_tokens(&self) -> usize {
            self.inner
                .get_post_processor()
                .map(|p| p.added_tokens(false))
                .unwrap_or(0)
        }
    }

    impl Tokenize for HfTokenizer {
        fn encode(&self, text: &str, max_length: usize) -> Result<Encoding> {
            let mut encoding = self
                .inner
                .encode_char_offsets(text, false)
                .map_err(|e| Error::Tokenizer(e.to_string()))?;
            let budget = max_length.saturating_sub(self.n_special_tokens());
            encoding.truncate(budget, 0, TruncationDirection::Right);
            let mut encoding = self
                .inner
                .post_process(encoding, None, true)
                .map_err(|e| Error::Tokenizer(e.to_string()))?;
            encoding.truncate(max_length, 0, TruncationDirection::Right);
            encoding.pad(
                max_length,
                self.pad_id,
                0,
                &self.pad_token,
                PaddingDirection::Right,
            );
            let special = encoding.get_special_tokens_mask().to_vec();
            let offsets: TokenOffsetMap = encoding
                .get_offsets()
                .iter()
                .zip(special)
                .map(|(&o, s)| if s == 1 { (0, 0) } else { o })
                .collect();
            Ok(Encoding {
                input_ids: encoding.get_ids().to_vec(),
                attention_mask: encoding.get_attention_mask().to_vec(),
                offsets,
            })
        }

        fn count_tokens(&self, text: &str) -> Result<usize> {
            let encoding = self
                .inner
                .encode_char_offsets(text, true)
                .map_err(|e| Error::Tokenizer(e.to_string()))?;
            Ok(encoding.len())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_char_tokenizer_pads_and_maps_offsets() {
        let tokenizer = CharTokenizer::from_texts(["ab c"]);
        let encoding = tokenizer.encode("ab c", 8).unwrap();
        assert_eq!(encoding.len(), 8);
        assert_eq!(encoding.input_ids, vec![2, 4, 5, 6, 7, 3, 0, 0]);
        assert_eq!(encoding.attention_mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
        assert_eq!(
            &encoding.offsets[..],
            &[(0, 0), (0, 1), (1, 2), (2, 3), (3, 4), (0, 0), (0, 0), (0, 0)]
        );
    }

    #[test]
    fn test_char_tokenizer_truncates() {
        let tokenizer = CharTokenizer::from_texts(["abcdef"]);
        let encoding = tokenizer.encode("abcdef", 4).unwrap();
        assert_eq!(encoding.input_ids, vec![2, 4, 5, 3]);
        assert_eq!(encoding.offsets.align(1), Ok(2));
        assert!(encoding.offsets.align(2).is_err());
        assert_eq!(tokenizer.count_tokens("abcdef").unwrap(), 8);
    }

    #[test]
    fn test_char_tokenizer_unknown_characters() {
        let tokenizer = CharTokenizer::from_texts(["a"]);
        assert_eq!(tokenizer.vocab_size(), 5);
        let encoding = tokenizer.encode("az", 4).unwrap();
        assert_eq!(encoding.input_ids, vec![2, 4, CharTokenizer::UNK_ID, 3]);
    }
}
