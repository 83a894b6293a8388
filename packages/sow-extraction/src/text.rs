//! Text helpers shared by search, dedup and grounding checks.

use std::collections::HashSet;
use std::ops::Range;

/// Words that carry no identity: honorifics, articles, corporate suffixes.
const STOPWORDS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "dr", "sir", "lady", "lord", "the", "late", "deceased", "of",
    "and", "ltd", "limited", "plc", "inc", "llc", "llp", "corp", "corporation", "co",
];

/// Lowercase, replace punctuation with spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identity-bearing tokens of a text.
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(String::from)
        .collect()
}

/// Similarity of two identity values in [0, 1].
///
/// Token overlap relative to the smaller token set, so containment of one
/// value in the other scores 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<String> = tokens(a).into_iter().collect();
    let right: HashSet<String> = tokens(b).into_iter().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    shared as f64 / left.len().min(right.len()) as f64
}

/// Whether `anchor` is mentioned in `text`: at least `threshold` of the
/// anchor's tokens appear among the text's tokens.
pub fn mentions(text: &str, anchor: &str, threshold: f64) -> bool {
    let anchor_tokens = tokens(anchor);
    if anchor_tokens.is_empty() {
        return false;
    }
    let text_tokens: HashSet<String> = tokens(text).into_iter().collect();
    let found = anchor_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    found as f64 / anchor_tokens.len() as f64 >= threshold
}

/// Case-insensitive containment of a phrase, on word boundaries.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    let text = format!(" {} ", normalize(text));
    text.contains(&format!(" {phrase} "))
}

/// Byte ranges of the sentences in a text.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace, or at a line
/// break. Ranges exclude surrounding whitespace.
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next_is_space = chars.peek().map_or(true, |(_, n)| n.is_whitespace());
        let ends = c == '\n' || (matches!(c, '.' | '!' | '?') && next_is_space);
        if ends {
            push_trimmed(text, start..i + c.len_utf8(), &mut spans);
            start = i + c.len_utf8();
        }
    }
    push_trimmed(text, start..text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, range: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing < slice.len() {
        spans.push(range.start + leading..range.end - trailing);
    }
}

/// The sentences of a text.
pub fn sentences(text: &str) -> Vec<&str> {
    sentence_spans(text)
        .into_iter()
        .map(|r| &text[r])
        .collect()
}

/// Slice `text` around `start..end`, widened by `window` bytes on each side
/// and snapped to char boundaries.
pub fn window(text: &str, start: usize, end: usize, window: usize) -> &str {
    let mut from = start.saturating_sub(window);
    while from > 0 && !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + window).min(text.len());
    while to < text.len() && !text.is_char_boundary(to) {
        to += 1;
    }
    &text[from..to]
}

/// Strip punctuation a regex may drag along at either end of a value.
pub fn trim_value(value: &str) -> &str {
    value
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | '!' | '?'))
        .trim_start_matches(|c: char| matches!(c, ',' | ';' | ':' | '('))
        .trim()
}
