//! Grounding checks for extracted values.
//!
//! A value is grounded when the narrative supports it: a literal quote, a
//! normalized match, or most of its key words present.

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeBase;
use crate::text;
use crate::types::record::SowRecord;

/// Share of key words that must appear for a loose match.
const KEY_WORD_COVERAGE: f64 = 0.8;

/// Values that say "we don't know" rather than quote anything.
const PLACEHOLDERS: &[&str] = &["unknown", "n/a", "na", "none", "not stated", "not specified", "unspecified"];

/// How well a value is supported by the narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// The value appears verbatim
    Literal,
    /// The value appears after normalization
    Normalized,
    /// Most key words of the value appear
    KeyWords,
    /// Too short or a placeholder; not checked
    Skipped,
    /// Nothing in the narrative supports the value
    Ungrounded,
}

impl Grounding {
    pub fn is_grounded(&self) -> bool {
        !matches!(self, Grounding::Ungrounded)
    }
}

/// Check one value against the narrative.
pub fn check_value(narrative: &str, value: &str) -> Grounding {
    let value = value.trim();
    if value.chars().count() < 3 || PLACEHOLDERS.contains(&value.to_lowercase().as_str()) {
        return Grounding::Skipped;
    }
    if narrative.contains(value) {
        return Grounding::Literal;
    }

    let normalized_value = text::normalize(value);
    if normalized_value.is_empty() {
        return Grounding::Skipped;
    }
    if text::contains_phrase(narrative, &normalized_value) {
        return Grounding::Normalized;
    }

    let words = key_words(value);
    if words.is_empty() {
        return Grounding::Skipped;
    }
    let narrative_norm = text::normalize(narrative);
    let found = words
        .iter()
        .filter(|w| text::contains_phrase(&narrative_norm, w))
        .count();
    if found as f64 / words.len() as f64 >= KEY_WORD_COVERAGE {
        Grounding::KeyWords
    } else {
        Grounding::Ungrounded
    }
}

/// Required fields of a record whose values the narrative does not support.
pub fn ungrounded_fields(record: &SowRecord, narrative: &str, kb: &KnowledgeBase) -> Vec<String> {
    kb.required_fields(record.source_type)
        .iter()
        .filter_map(|spec| {
            let value = record.value(&spec.name)?;
            (!check_value(narrative, value).is_grounded()).then(|| spec.name.clone())
        })
        .collect()
}

/// Tokens worth checking: digits or words longer than three characters.
fn key_words(value: &str) -> Vec<String> {
    text::tokens(value)
        .into_iter()
        .filter(|t| t.len() > 3 || t.chars().any(|c| c.is_ascii_digit()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::record_with;
    use crate::types::source::SourceType;

    const NARRATIVE: &str = "I have worked at Meridian Capital since 2001 as a Senior Analyst, \
        earning around £95,000 a year.";

    #[test]
    fn test_literal_and_normalized() {
        assert_eq!(check_value(NARRATIVE, "Meridian Capital"), Grounding::Literal);
        assert_eq!(check_value(NARRATIVE, "senior analyst"), Grounding::Normalized);
    }

    #[test]
    fn test_key_words() {
        assert_eq!(
            check_value(NARRATIVE, "Analyst, Meridian Capital"),
            Grounding::KeyWords
        );
    }

    #[test]
    fn test_ungrounded_and_skipped() {
        assert_eq!(check_value(NARRATIVE, "Goldman Sachs"), Grounding::Ungrounded);
        assert_eq!(check_value(NARRATIVE, "UK"), Grounding::Skipped);
        assert_eq!(check_value(NARRATIVE, "Unknown"), Grounding::Skipped);
    }

    #[test]
    fn test_ungrounded_fields_lists_required_only() {
        let kb = KnowledgeBase::bundled().unwrap();
        let record = record_with(
            SourceType::EmploymentIncome,
            &[
                ("employer_name", "Meridian Capital"),
                ("job_title", "Managing Director"),
                ("team", "Equity Research Desk"),
            ],
        );
        assert_eq!(ungrounded_fields(&record, NARRATIVE, &kb), vec!["job_title"]);
    }
}
