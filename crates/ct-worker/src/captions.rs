//! Turning timed words and translated text into captions.

use std::time::Duration;

use chrono::Utc;

use ct_models::{ticks_to_duration, Caption, Word};

/// Characters that close a caption when a word ends with them.
const SENTENCE_END: [char; 4] = ['.', '?', '!', '"'];

fn ends_sentence(word: &str) -> bool {
    word.chars().last().is_some_and(|c| SENTENCE_END.contains(&c))
}

/// Group aligned words into captions of at most `max_chars` characters.
///
/// A caption also closes after a sentence-ending word. Times are shifted by
/// `restart_offset`; indices start at `first_index`.
pub fn words_to_captions(words: &[Word], first_index: u32, restart_offset: Duration, max_chars: usize) -> Vec<Caption> {
    let mut captions = Vec::new();
    let mut index = first_index;
    let mut text = String::new();
    let mut begin: Option<Duration> = None;
    let mut end = Duration::ZERO;

    let mut emit = |text: &mut String, begin: &mut Option<Duration>, end: Duration| {
        if let Some(start) = begin.take() {
            captions.push(Caption::new(index, start, end, text.trim()));
            index += 1;
        }
        text.clear();
    };

    for word in words {
        let candidate = text.chars().count() + word.raw_text.chars().count() + 1;
        if begin.is_some() && candidate > max_chars {
            emit(&mut text, &mut begin, end);
        }

        begin.get_or_insert(ticks_to_duration(word.offset) + restart_offset);
        end = ticks_to_duration(word.end()) + restart_offset;

        text.push_str(&word.raw_text);
        text.push(' ');

        if ends_sentence(&word.raw_text) {
            emit(&mut text, &mut begin, end);
        }
    }
    emit(&mut text, &mut begin, end);

    captions
}

/// Split `text` into chunks of at least `min_chars` characters, breaking at spaces.
fn chunk_text(text: &str, min_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if current.chars().count() >= min_chars {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Spread untimed text (a translation) over `[begin, end]`.
///
/// Each chunk gets a share of the span proportional to its length.
pub fn interpolate_captions(text: &str, begin: Duration, end: Duration, first_index: u32, max_chars: usize) -> Vec<Caption> {
    let chunks = chunk_text(text, max_chars);
    let total: u128 = chunks.iter().map(|c| c.chars().count() as u128).sum();
    if total == 0 {
        return Vec::new();
    }

    let span = end.saturating_sub(begin).as_nanos();
    let at = |chars: u128| begin + Duration::from_nanos((span * chars / total) as u64);

    let mut consumed = 0u128;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let start = at(consumed);
            consumed += chunk.chars().count() as u128;
            Caption::new(first_index + i as u32, start, at(consumed), chunk)
        })
        .collect()
}

/// Three consecutive 3-second placeholder captions.
pub fn mock_captions(language: &str, first_index: u32) -> Vec<Caption> {
    let step = Duration::from_secs(3);
    let now = Utc::now().to_rfc3339();
    (0..3u32)
        .map(|i| {
            let begin = step * i;
            let index = first_index + i;
            Caption::new(
                index,
                begin,
                begin + step,
                format!("The Caption in {} is {} on {}", language, index + 100, now),
            )
        })
        .collect()
}
