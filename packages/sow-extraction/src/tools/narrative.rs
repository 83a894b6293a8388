//! Deterministic toolbox that searches the narrative text directly.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::trace;

use super::patterns::entity_regex;
use crate::error::{ToolError, ToolResult};
use crate::text;
use crate::traits::toolbox::{EntityKind, SearchToolbox, ToolCall, ToolMatch};

/// Patterns larger than this are rejected as tool errors.
const MAX_PATTERN_SIZE: usize = 1 << 20;

/// In-process search over the narrative: literal, regex, passage and
/// entity search plus quote verification.
#[derive(Debug, Clone)]
pub struct NarrativeToolbox {
    context_chars: usize,
}

impl Default for NarrativeToolbox {
    fn default() -> Self {
        Self { context_chars: 80 }
    }
}

impl NarrativeToolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how much text around a match is returned as context.
    pub fn with_context_chars(mut self, chars: usize) -> Self {
        self.context_chars = chars;
        self
    }

    fn exact_search(&self, narrative: &str, needle: &str) -> ToolResult<Option<ToolMatch>> {
        let needle = needle.trim();
        if needle.is_empty() {
            return Ok(None);
        }
        let re = compile(&format!("(?i){}", regex::escape(needle)))?;
        Ok(re.find(narrative).map(|m| {
            ToolMatch::new(
                m.as_str(),
                text::window(narrative, m.start(), m.end(), self.context_chars),
            )
        }))
    }

    fn regex_search(&self, haystack: &str, pattern: &str) -> ToolResult<Option<ToolMatch>> {
        let re = compile(pattern)?;
        for caps in re.captures_iter(haystack) {
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let value = text::trim_value(m.as_str());
            if value.is_empty() {
                continue;
            }
            let start = m.start() + m.as_str().find(value).unwrap_or(0);
            return Ok(Some(ToolMatch::new(
                value,
                text::window(haystack, start, start + value.len(), self.context_chars),
            )));
        }
        Ok(None)
    }

    /// Best sentence by keyword hits; context is that sentence and the
    /// one after it.
    fn paragraph_search(&self, narrative: &str, keywords: &[String]) -> Option<ToolMatch> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| text::normalize(k))
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return None;
        }

        let spans = text::sentence_spans(narrative);
        let mut best: Option<(usize, usize)> = None;
        for (i, span) in spans.iter().enumerate() {
            let sentence = &narrative[span.clone()];
            let score = keywords
                .iter()
                .filter(|k| text::contains_phrase(sentence, k))
                .count();
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let (i, score) = best?;
        trace!(sentence = i, score, "Paragraph search picked sentence");
        let span = spans[i].clone();
        let context_end = spans.get(i + 1).map_or(span.end, |next| next.end);
        Some(ToolMatch::new(
            &narrative[span.clone()],
            &narrative[span.start..context_end],
        ))
    }

    fn entity_search(
        &self,
        narrative: &str,
        kind: EntityKind,
        within: Option<&str>,
        exclude: &[String],
    ) -> Option<ToolMatch> {
        let haystack = within.unwrap_or(narrative);
        entity_regex(kind)
            .find_iter(haystack)
            .map(|m| (m.start(), text::trim_value(m.as_str())))
            .filter(|(_, value)| !value.is_empty())
            .find(|(_, value)| !exclude.iter().any(|x| text::similarity(value, x) >= 1.0))
            .map(|(start, value)| {
                ToolMatch::new(
                    value,
                    text::window(haystack, start, start + value.len(), self.context_chars),
                )
            })
    }

    fn verify_quote(&self, narrative: &str, quote: &str) -> Option<ToolMatch> {
        if quote.is_empty() {
            return None;
        }
        narrative.find(quote).map(|start| {
            ToolMatch::new(
                quote,
                text::window(narrative, start, start + quote.len(), self.context_chars),
            )
        })
    }
}

fn compile(pattern: &str) -> ToolResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(MAX_PATTERN_SIZE)
        .build()
        .map_err(|source| ToolError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[async_trait]
impl SearchToolbox for NarrativeToolbox {
    async fn invoke(&self, call: &ToolCall, narrative: &str) -> ToolResult<Option<ToolMatch>> {
        match call {
            ToolCall::ExactSearch { text } => self.exact_search(narrative, text),
            ToolCall::RegexSearch { pattern, within } => {
                self.regex_search(within.as_deref().unwrap_or(narrative), pattern)
            }
            ToolCall::ParagraphSearch { keywords } => Ok(self.paragraph_search(narrative, keywords)),
            ToolCall::EntitySearch {
                kind,
                within,
                exclude,
            } => Ok(self.entity_search(narrative, *kind, within.as_deref(), exclude)),
            ToolCall::VerifyQuote { quote } => Ok(self.verify_quote(narrative, quote)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NARRATIVE: &str = "I worked at Meridian Capital in London. I joined in 1985 as a \
        trainee and now earn £250,000 a year.\n\nMy grandmother Margaret Hill sold her house at \
        12 Rose Lane, Bath in 2019. She used the proceeds to give me £100,000.";

    #[tokio::test]
    async fn test_exact_search_is_case_insensitive() {
        let toolbox = NarrativeToolbox::new();
        let m = toolbox
            .invoke(&ToolCall::exact("meridian capital"), NARRATIVE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.span, "Meridian Capital");
        assert!(m.context.contains("worked at"));
    }

    #[tokio::test]
    async fn test_regex_search_returns_group_one() {
        let toolbox = NarrativeToolbox::new();
        let m = toolbox
            .invoke(&ToolCall::regex(r"joined in (\d{4})"), NARRATIVE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.span, "1985");
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_tool_error() {
        let toolbox = NarrativeToolbox::new();
        let err = toolbox
            .invoke(&ToolCall::regex("(unclosed"), NARRATIVE)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidPattern { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_paragraph_search_scores_keywords() {
        let toolbox = NarrativeToolbox::new();
        let m = toolbox
            .invoke(&ToolCall::paragraph(["sold", "house"]), NARRATIVE)
            .await
            .unwrap()
            .unwrap();
        assert!(m.span.starts_with("My grandmother"));
        assert!(m.context.contains("proceeds"));

        let none = toolbox
            .invoke(&ToolCall::paragraph(["yacht"]), NARRATIVE)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_entity_search_scoped_and_excluding() {
        let toolbox = NarrativeToolbox::new();
        let call = ToolCall::entity(EntityKind::Money).within("She used the proceeds to give me £100,000.");
        let m = toolbox.invoke(&call, NARRATIVE).await.unwrap().unwrap();
        assert_eq!(m.span, "£100,000");

        let call = ToolCall::entity(EntityKind::Person).excluding(["Meridian Capital"]);
        let m = toolbox.invoke(&call, NARRATIVE).await.unwrap().unwrap();
        assert_eq!(m.span, "Margaret Hill");
    }

    #[tokio::test]
    async fn test_verify_quote_is_literal() {
        let toolbox = NarrativeToolbox::new();
        assert!(toolbox
            .invoke(&ToolCall::verify("joined in 1985"), NARRATIVE)
            .await
            .unwrap()
            .is_some());
        assert!(toolbox
            .invoke(&ToolCall::verify("Joined in 1985"), NARRATIVE)
            .await
            .unwrap()
            .is_none());
        assert!(toolbox
            .invoke(&ToolCall::verify(""), NARRATIVE)
            .await
            .unwrap()
            .is_none());
    }
}
