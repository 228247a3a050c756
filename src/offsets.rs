/*!
Alignment between character offsets and token indices.
*/
use crate::error::AlignmentError;
use crate::example::Span;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Maps each token index to the `[char_start, char_end)` range it covers. Special and padding
/// tokens are mapped to the degenerate range `(0, 0)`, which contains no character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenOffsetMap(Vec<(usize, usize)>);

impl Deref for TokenOffsetMap {
    type Target = [(usize, usize)];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<(usize, usize)>> for TokenOffsetMap {
    fn from(value: Vec<(usize, usize)>) -> Self {
        TokenOffsetMap(value)
    }
}

impl FromIterator<(usize, usize)> for TokenOffsetMap {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        TokenOffsetMap(iter.into_iter().collect())
    }
}

impl TokenOffsetMap {
    pub fn new(offsets: Vec<(usize, usize)>) -> Self {
        Self(offsets)
    }

    /// Index of the first token whose character range contains `char_index`.
    pub fn align(&self, char_index: usize) -> Result<usize, AlignmentError> {
        self.0
            .iter()
            .position(|&(start, end)| start <= char_index && char_index < end)
            .ok_or(AlignmentError { char_index })
    }

    /// Head and tail tokens of a span. The tail is the token holding the last character of the
    /// span, i.e. `end - 1` since the end is exclusive.
    pub fn align_span(&self, span: Span) -> Result<(usize, usize), AlignmentError> {
        assert!(
            span.end > span.start,
            "shape invariant violated: span {span} ends before it starts"
        );
        let head = self.align(span.start)?;
        let tail = self.align(span.last())?;
        Ok((head, tail))
    }

    /// Character span going from the first character of the `head` token to the last character
    /// of the `tail` token. Returns `None` for out of range, degenerate or inverted tokens.
    pub fn char_span(&self, head: usize, tail: usize) -> Option<Span> {
        if head > tail {
            return None;
        }
        let &(start, head_end) = self.0.get(head)?;
        let &(tail_start, end) = self.0.get(tail)?;
        if head_end <= start || end <= tail_start {
            return None;
        }
        Span::try_new(start, end).ok()
    }

    /// Number of tokens whose range is not degenerate.
    pub fn covered_tokens(&self) -> usize {
        self.0.iter().filter(|(s, e)| e > s).count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    /// `[CLS] ab cd e [SEP] [PAD]` over the text `"ab cd e"`.
    fn build_offsets() -> TokenOffsetMap {
        TokenOffsetMap::new(vec![(0, 0), (0, 2), (3, 5), (6, 7), (0, 0), (0, 0)])
    }

    #[test]
    fn test_align() {
        let offsets = build_offsets();
        let cases = [
            (0, Ok(1)),
            (1, Ok(1)),
            (2, Err(AlignmentError { char_index: 2 })),
            (3, Ok(2)),
            (4, Ok(2)),
            (6, Ok(3)),
            (7, Err(AlignmentError { char_index: 7 })),
            (100, Err(AlignmentError { char_index: 100 })),
        ];
        for (char_index, expected) in cases {
            dbg!(char_index);
            assert_eq!(offsets.align(char_index), expected);
        }
    }

    #[test]
    fn test_align_span_uses_last_character() {
        let offsets = build_offsets();
        assert_eq!(offsets.align_span(Span::new(0, 5)), Ok((1, 2)));
        assert_eq!(offsets.align_span(Span::new(3, 5)), Ok((2, 2)));
        // The end itself (5) is whitespace and is not covered by any token.
        assert_eq!(offsets.align(5), Err(AlignmentError { char_index: 5 }));
        assert_eq!(
            offsets.align_span(Span::new(6, 9)),
            Err(AlignmentError { char_index: 8 })
        );
    }

    #[test]
    fn test_char_span() {
        let offsets = build_offsets();
        assert_eq!(offsets.char_span(1, 2), Some(Span::new(0, 5)));
        assert_eq!(offsets.char_span(3, 3), Some(Span::new(6, 7)));
        assert_eq!(offsets.char_span(2, 1), None);
        assert_eq!(offsets.char_span(0, 2), None);
        assert_eq!(offsets.char_span(3, 4), None);
        assert_eq!(offsets.char_span(3, 42), None);
        assert_eq!(offsets.covered_tokens(), 3);
    }

    #[test]
    fn test_propertie_alignment_round_trip() {
        // Tokens of random widths separated by random gaps. Any span starting on a token start
        // and ending on a token end must come back unchanged.
        fn propertie_round_trip(widths: Vec<(u8, u8)>, first: usize, second: usize) -> TestResult {
            if widths.is_empty() {
                return TestResult::discard();
            }
            let mut offsets = vec![(0, 0)];
            let mut cursor = 0;
            for (width, gap) in widths.iter() {
                let width = (*width as usize % 5) + 1;
                cursor += *gap as usize % 3;
                offsets.push((cursor, cursor + width));
                cursor += width;
            }
            offsets.push((0, 0));
            let map = TokenOffsetMap::new(offsets);
            let n_tokens = widths.len();
            let head = 1 + first % n_tokens;
            let tail = 1 + second % n_tokens;
            if head > tail {
                return TestResult::discard();
            }
            let span = Span::new(map[head].0, map[tail].1);
            let aligned = map.align_span(span);
            TestResult::from_bool(
                aligned == Ok((head, tail)) && map.char_span(head, tail) == Some(span),
            )
        }
        let mut qc = QuickCheck::new().tests(1000);
        qc.quickcheck(propertie_round_trip as fn(Vec<(u8, u8)>, usize, usize) -> TestResult);
    }
}
