//! Caption alignment.
//!
//! The recognizer reports two views of one utterance: the display text
//! (with casing and punctuation) and a word list with timings whose words
//! are normalized differently. [`align_utterance`] gives every display word
//! a timing:
//!
//! 1. Both streams are tokenized and each token is counted within its own stream.
//! 2. Zero-length sentinels pin the start (first recognized offset) and end
//!    (last recognized end) of the sentence.
//! 3. Tokens occurring exactly once in both streams copy the recognized timing.
//! 4. Every run of words left between two anchored neighbours shares the gap
//!    evenly, chaining each word's offset from the previous word's end.
//!
//! All arithmetic is integer ticks; the last word of a run absorbs the
//! division remainder.

use std::collections::HashMap;

use ct_models::{Ticks, Word};

/// Count how often each token occurs and store it on every word.
fn assign_occurrence_counts(words: &mut [Word]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in words.iter() {
        *counts.entry(word.token.clone()).or_insert(0) += 1;
    }
    for word in words.iter_mut() {
        word.occurrence_count = counts.get(&word.token).copied().unwrap_or(0);
    }
}

/// Shift recognized words so the earliest starts at `utterance_offset`.
///
/// Word offsets come back on a different origin from the utterance offset.
/// Words are sorted by offset first. Shifted offsets saturate at the
/// bounds of [`Ticks`].
pub fn rebase_words(utterance_offset: Ticks, words: &mut [Word]) {
    words.sort_by_key(|w| w.offset);
    let Some(first) = words.first().map(|w| w.offset) else {
        return;
    };
    for word in words.iter_mut() {
        let relative = word.offset.saturating_sub(first);
        word.offset = utterance_offset.saturating_add(relative);
    }
}

/// Time every whitespace-separated word of `text` using `recognized`.
///
/// Returns the words of `text` in order, all anchored. Empty `text` or an
/// empty `recognized` stream yields no words.
pub fn align_utterance(text: &str, recognized: &[Word]) -> Vec<Word> {
    let (Some(first), Some(last)) = (recognized.first(), recognized.last()) else {
        return Vec::new();
    };

    let mut reference: Vec<Word> = recognized
        .iter()
        .map(|w| Word::timed(w.raw_text.clone(), w.offset, w.duration))
        .collect();
    assign_occurrence_counts(&mut reference);

    let mut sentence: Vec<Word> = text.split_whitespace().map(Word::new).collect();
    if sentence.is_empty() {
        return Vec::new();
    }
    assign_occurrence_counts(&mut sentence);

    sentence.insert(0, Word::sentinel(first.offset));
    sentence.push(Word::sentinel(last.end()));

    let unique: HashMap<&str, &Word> = reference
        .iter()
        .filter(|w| w.occurrence_count == 1)
        .map(|w| (w.token.as_str(), w))
        .collect();

    let inner = sentence.len() - 1;
    for word in &mut sentence[1..inner] {
        if word.occurrence_count != 1 {
            continue;
        }
        if let Some(matched) = unique.get(word.token.as_str()) {
            word.offset = matched.offset;
            word.duration = matched.duration;
            word.anchored = true;
        }
    }

    interpolate_runs(&mut sentence);

    sentence.pop();
    sentence.remove(0);
    sentence
}

/// Spread each gap between anchored words over the unanchored words inside it.
fn interpolate_runs(words: &mut [Word]) {
    let mut last_anchored = 0;
    for i in 1..words.len() {
        if !words[i].anchored {
            continue;
        }
        let run = i - last_anchored - 1;
        if run > 0 {
            let start = words[last_anchored].end();
            // Out-of-order direct matches can make the gap negative
            let gap = words[i].offset.saturating_sub(start).max(0);
            let share = gap / run as Ticks;

            let mut next_offset = start;
            for word in &mut words[last_anchored + 1..i] {
                word.offset = next_offset;
                word.duration = share;
                word.anchored = true;
                next_offset = word.end();
            }
        }
        last_anchored = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(words: &[(&str, Ticks, Ticks)]) -> Vec<Word> {
        words.iter().map(|(t, o, d)| Word::timed(*t, *o, *d)).collect()
    }

    fn timings(words: &[Word]) -> Vec<(String, Ticks, Ticks)> {
        words.iter().map(|w| (w.raw_text.clone(), w.offset, w.duration)).collect()
    }

    #[test]
    fn test_ambiguous_word_interpolates_from_start() {
        let recognized = timed(&[("the", 0, 100), ("the", 100, 100), ("cat", 200, 100)]);
        let aligned = align_utterance("the cat", &recognized);

        assert_eq!(
            timings(&aligned),
            vec![("the".to_string(), 0, 200), ("cat".to_string(), 200, 100)]
        );
        assert!(aligned.iter().all(|w| w.anchored));
    }

    #[test]
    fn test_punctuation_and_case_are_ignored_for_matching() {
        let recognized = timed(&[
            ("a", 0, 50),
            ("man", 50, 50),
            ("and", 100, 50),
            ("a", 150, 50),
            ("woman", 200, 50),
        ]);
        let aligned = align_utterance("A man and, a woman.", &recognized);

        assert_eq!(
            timings(&aligned),
            vec![
                ("A".to_string(), 0, 50),
                ("man".to_string(), 50, 50),
                ("and,".to_string(), 100, 50),
                ("a".to_string(), 150, 50),
                ("woman.".to_string(), 200, 50),
            ]
        );
    }

    #[test]
    fn test_single_unmatched_word_spans_sentinels() {
        let recognized = timed(&[("hello", 1_000, 400)]);
        let aligned = align_utterance("Hi.", &recognized);

        assert_eq!(timings(&aligned), vec![("Hi.".to_string(), 1_000, 400)]);
    }

    #[test]
    fn test_interpolation_sums_to_gap() {
        // "x y z" have no counterpart; they share the gap between "start" (ends 100) and "end" (at 1100)
        let recognized = timed(&[("start", 0, 100), ("end", 1_100, 100)]);
        let aligned = align_utterance("start x y z end", &recognized);

        let interior = &aligned[1..4];
        let gap = 1_100 - 100;
        let total: Ticks = interior.iter().map(|w| w.duration).sum();
        assert!(gap - total <= interior.len() as Ticks - 1);
        assert_eq!(interior[0].offset, 100);
        for pair in interior.windows(2) {
            assert_eq!(pair[1].offset, pair[0].end());
        }
        assert_eq!(aligned[4].offset, 1_100);
    }

    #[test]
    fn test_adjacent_anchors_then_run() {
        let recognized = timed(&[
            ("one", 0, 10),
            ("two", 10, 10),
            ("uh", 20, 10),
            ("uh", 30, 10),
            ("three", 60, 10),
        ]);
        let aligned = align_utterance("one two uh uh three", &recognized);

        // the "uh" run sits between "two" (ends 20) and "three" (starts 60)
        assert_eq!(aligned[2].offset, 20);
        assert_eq!(aligned[2].duration, 20);
        assert_eq!(aligned[3].offset, 40);
        assert_eq!(aligned[3].duration, 20);
    }

    #[test]
    fn test_out_of_order_match_clamps_gap() {
        let recognized = timed(&[("late", 500, 100), ("early", 0, 100)]);
        let mut rebased = recognized.clone();
        rebase_words(0, &mut rebased);

        let aligned = align_utterance("late filler early", &rebased);
        assert_eq!(aligned[1].duration, 0);
        assert!(aligned.iter().all(|w| w.duration >= 0));
    }

    #[test]
    fn test_alignment_is_idempotent_for_unique_tokens() {
        let recognized = timed(&[("we", 0, 30), ("study", 30, 70), ("graphs", 100, 90)]);
        let first = align_utterance("We study graphs.", &recognized);
        let second = align_utterance("We study graphs.", &first);

        assert_eq!(timings(&first), timings(&second));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(align_utterance("hello", &[]).is_empty());
        assert!(align_utterance("   ", &timed(&[("a", 0, 1)])).is_empty());
    }

    #[test]
    fn test_rebase_words() {
        let mut words = timed(&[("b", 5_000, 10), ("a", 4_000, 10)]);
        rebase_words(100, &mut words);

        assert_eq!(words[0].raw_text, "a");
        assert_eq!(words[0].offset, 100);
        assert_eq!(words[1].offset, 1_100);
    }

    #[test]
    fn test_rebase_words_extreme_offsets_saturate() {
        let mut words = timed(&[("a", Ticks::MIN, 1), ("b", Ticks::MAX - 1, 1)]);
        rebase_words(100, &mut words);

        assert_eq!(words[0].offset, 100);
        assert_eq!(words[1].offset, Ticks::MAX);
    }
}
