//! Typed contract for the service's detailed recognition result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ct_models::{Ticks, Word};

/// A recognition result that cannot be captioned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("Malformed recognition payload: {0}")]
    Malformed(String),

    #[error("Recognition payload has no text")]
    MissingText,

    #[error("Invalid timing in recognition payload: {0}")]
    InvalidTiming(String),
}

/// One word of the recognizer's word-level stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecognizedWord {
    pub word: String,
    pub offset: Ticks,
    pub duration: Ticks,
}

/// A recognized span of speech with its word timings and translations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Utterance {
    pub text: String,
    pub offset: Ticks,
    pub duration: Ticks,
    pub words: Vec<RecognizedWord>,
    /// language -> translated text
    pub translations: BTreeMap<String, String>,
}

impl Utterance {
    /// Nothing was said: no text and no words.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.words.is_empty()
    }

    /// Word stream as alignment input.
    pub fn timed_words(&self) -> Vec<Word> {
        self.words
            .iter()
            .map(|w| Word::timed(w.word.clone(), w.offset, w.duration))
            .collect()
    }

    pub fn end(&self) -> Ticks {
        self.offset.saturating_add(self.duration)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetailedResult {
    display_text: Option<String>,
    text: Option<String>,
    offset: Ticks,
    duration: Ticks,
    #[serde(default)]
    words: Option<Vec<RecognizedWord>>,
    #[serde(default, alias = "Translation")]
    translations: Option<BTreeMap<String, String>>,
}

/// Parse the service's detailed JSON result.
pub fn parse_detailed_result(json: &str) -> Result<Utterance, PayloadError> {
    let raw: DetailedResult = serde_json::from_str(json).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    validate(raw)
}

/// Same as [`parse_detailed_result`] for an already decoded JSON value.
pub(crate) fn parse_detailed_value(value: serde_json::Value) -> Result<Utterance, PayloadError> {
    let raw: DetailedResult = serde_json::from_value(value).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    validate(raw)
}

fn validate(raw: DetailedResult) -> Result<Utterance, PayloadError> {
    let text = raw.display_text.or(raw.text).ok_or(PayloadError::MissingText)?;

    if raw.offset < 0 || raw.duration < 0 {
        return Err(PayloadError::InvalidTiming(format!(
            "offset={} duration={}",
            raw.offset, raw.duration
        )));
    }

    let words = raw.words.unwrap_or_default();
    if let Some(bad) = words
        .iter()
        .find(|w| w.offset < 0 || w.duration < 0 || w.offset.checked_add(w.duration).is_none())
    {
        return Err(PayloadError::InvalidTiming(format!(
            "word '{}' has offset {} duration {}",
            bad.word, bad.offset, bad.duration
        )));
    }

    Ok(Utterance {
        text,
        offset: raw.offset,
        duration: raw.duration,
        words,
        translations: raw.translations.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_result() {
        let json = r#"{
            "DisplayText": "Hello world.",
            "Offset": 1000,
            "Duration": 5000,
            "Words": [
                {"Word": "hello", "Offset": 1000, "Duration": 2000},
                {"Word": "world", "Offset": 3000, "Duration": 3000}
            ],
            "Translations": {"es": "Hola mundo."}
        }"#;

        let utterance = parse_detailed_result(json).unwrap();
        assert_eq!(utterance.text, "Hello world.");
        assert_eq!(utterance.end(), 6000);
        assert_eq!(utterance.words.len(), 2);
        assert_eq!(utterance.translations["es"], "Hola mundo.");
        assert_eq!(utterance.timed_words()[1].token, "world");
    }

    #[test]
    fn test_text_fallback_and_null_lists() {
        let utterance = parse_detailed_result(r#"{"Text":"hi","Offset":0,"Duration":1,"Words":null}"#).unwrap();
        assert_eq!(utterance.text, "hi");
        assert!(utterance.words.is_empty());
        assert!(utterance.translations.is_empty());
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            parse_detailed_result(r#"{"Offset":0,"Duration":1}"#),
            Err(PayloadError::MissingText)
        );
        assert!(matches!(
            parse_detailed_result(r#"{"Text":"x","Offset":-1,"Duration":1}"#),
            Err(PayloadError::InvalidTiming(_))
        ));
        assert!(matches!(
            parse_detailed_result(r#"{"Text":"x","Offset":0,"Duration":1,"Words":[{"Word":"x","Offset":0,"Duration":-5}]}"#),
            Err(PayloadError::InvalidTiming(_))
        ));
        assert!(matches!(
            parse_detailed_result(r#"{"Text":"x","Offset":0,"Duration":1,"Words":[{"Word":"x","Offset":9223372036854775807,"Duration":1}]}"#),
            Err(PayloadError::InvalidTiming(_))
        ));
        assert!(matches!(
            parse_detailed_result(r#"{"Text":"x","Words":[{"Word":3}]}"#),
            Err(PayloadError::Malformed(_))
        ));
        assert!(matches!(parse_detailed_result("not json"), Err(PayloadError::Malformed(_))));
    }

    #[test]
    fn test_negative_word_offset_is_rejected() {
        let json = r#"{
            "Text": "hi there",
            "Offset": 100,
            "Duration": 10,
            "Words": [
                {"Word": "hi", "Offset": -9223372036854775808, "Duration": 1},
                {"Word": "there", "Offset": 5, "Duration": 1}
            ]
        }"#;
        assert!(matches!(parse_detailed_result(json), Err(PayloadError::InvalidTiming(_))));
    }

    #[test]
    fn test_empty_utterance() {
        let utterance = parse_detailed_result(r#"{"Text":"","Offset":0,"Duration":10}"#).unwrap();
        assert!(utterance.is_empty());
    }
}
