//! Timed words used by caption alignment.

use serde::{Deserialize, Serialize};

use crate::time::Ticks;

/// A single recognized or sentence-derived word.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Word {
    /// Lower-cased, punctuation-free form used only for matching
    pub token: String,
    /// Text as it appears in its stream
    pub raw_text: String,
    /// Start offset in ticks
    pub offset: Ticks,
    /// Duration in ticks
    pub duration: Ticks,
    /// How many times `token` appears in this word's own stream
    pub occurrence_count: usize,
    /// Set once the word has a definite offset and duration
    pub anchored: bool,
}

impl Word {
    /// Create an untimed word from raw text.
    pub fn new(raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        Self {
            token: tokenize(&raw_text),
            raw_text,
            ..Default::default()
        }
    }

    /// Create a word with timing already known (not anchored yet).
    pub fn timed(raw_text: impl Into<String>, offset: Ticks, duration: Ticks) -> Self {
        Self {
            offset,
            duration,
            ..Self::new(raw_text)
        }
    }

    /// Empty, anchored, zero-length word used to pin the ends of a sentence.
    pub fn sentinel(offset: Ticks) -> Self {
        Self {
            offset,
            occurrence_count: 1,
            anchored: true,
            ..Default::default()
        }
    }

    /// `offset + duration`.
    pub fn end(&self) -> Ticks {
        self.offset.saturating_add(self.duration)
    }
}

/// Lower-case `s` and strip punctuation.
pub fn tokenize(s: &str) -> String {
    s.chars()
        .filter(|c| !is_punctuation(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Unicode punctuation (connector, dash, open/close, quote and other).
///
/// Symbols such as `$`, `+`, `<`, `=`, `>`, `^`, `` ` ``, `|` and `~` are not
/// punctuation and survive tokenization.
pub fn is_punctuation(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_punctuation() && !matches!(c, '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~');
    }
    matches!(
        c,
        '\u{00A1}' | '\u{00A7}' | '\u{00AB}' | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}'
            | '\u{2010}'..='\u{2027}'
            | '\u{2030}'..='\u{205E}'
            | '\u{3001}'..='\u{3003}'
            | '\u{3008}'..='\u{3011}'
            | '\u{3014}'..='\u{301F}'
            | '\u{FF01}'..='\u{FF03}'
            | '\u{FF05}'..='\u{FF0A}'
            | '\u{FF0C}'..='\u{FF0F}'
            | '\u{FF1A}'
            | '\u{FF1B}'
            | '\u{FF1F}'
            | '\u{FF20}'
            | '\u{FF3B}'..='\u{FF3D}'
            | '\u{FF3F}'
            | '\u{FF5B}'
            | '\u{FF5D}'
            | '\u{FF5F}'..='\u{FF65}'
    ) && !matches!(c, '\u{2044}' | '\u{2052}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation_and_case() {
        assert_eq!(tokenize("Woman."), "woman");
        assert_eq!(tokenize("and,"), "and");
        assert_eq!(tokenize("\"Hello!\""), "hello");
        assert_eq!(tokenize("don't"), "dont");
        assert_eq!(tokenize("¿Qué?"), "qué");
    }

    #[test]
    fn test_tokenize_keeps_symbols() {
        assert_eq!(tokenize("$5"), "$5");
        assert_eq!(tokenize("a+b"), "a+b");
    }

    #[test]
    fn test_pure_punctuation_has_empty_token() {
        assert_eq!(Word::new("—").token, "");
        assert_eq!(Word::new("...").token, "");
    }

    #[test]
    fn test_sentinel_is_anchored() {
        let s = Word::sentinel(42);
        assert!(s.anchored);
        assert_eq!(s.end(), 42);
        assert!(s.token.is_empty());
    }
}
