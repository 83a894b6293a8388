//! Search toolbox trait used by the bounded field-search loop.
//!
//! A toolbox answers one [`ToolCall`] at a time against the narrative.
//! "No match" is `Ok(None)`; `Err` is reserved for tool failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolResult;
use crate::knowledge::FieldFormat;
use crate::types::evidence::ToolKind;

/// Kinds of named entity the entity search recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Money,
    Date,
    Location,
    Percentage,
}

impl EntityKind {
    /// Entity kind matching a field format; free text has none.
    pub fn for_format(format: FieldFormat) -> Option<Self> {
        match format {
            FieldFormat::Name => Some(EntityKind::Person),
            FieldFormat::Organization => Some(EntityKind::Organization),
            FieldFormat::Date => Some(EntityKind::Date),
            FieldFormat::Money => Some(EntityKind::Money),
            FieldFormat::Percentage => Some(EntityKind::Percentage),
            FieldFormat::Location => Some(EntityKind::Location),
            FieldFormat::Text => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "organization",
            EntityKind::Money => "money",
            EntityKind::Date => "date",
            EntityKind::Location => "location",
            EntityKind::Percentage => "percentage",
        }
    }
}

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    /// Case-insensitive literal search
    ExactSearch { text: String },

    /// Regex search; capture group 1 is the value when present
    RegexSearch {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within: Option<String>,
    },

    /// Best passage by keyword overlap
    ParagraphSearch { keywords: Vec<String> },

    /// First entity of a kind, optionally inside a scope text
    EntitySearch {
        kind: EntityKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        within: Option<String>,
        /// Values to skip (holder names, values already on the record)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<String>,
    },

    /// Confirm a quote appears verbatim in the narrative
    VerifyQuote { quote: String },
}

impl ToolCall {
    pub fn exact(text: impl Into<String>) -> Self {
        Self::ExactSearch { text: text.into() }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::RegexSearch {
            pattern: pattern.into(),
            within: None,
        }
    }

    pub fn paragraph(keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::ParagraphSearch {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entity(kind: EntityKind) -> Self {
        Self::EntitySearch {
            kind,
            within: None,
            exclude: vec![],
        }
    }

    pub fn verify(quote: impl Into<String>) -> Self {
        Self::VerifyQuote {
            quote: quote.into(),
        }
    }

    /// Restrict a regex or entity search to a scope text.
    pub fn within(self, scope: impl Into<String>) -> Self {
        match self {
            Self::RegexSearch { pattern, .. } => Self::RegexSearch {
                pattern,
                within: Some(scope.into()),
            },
            Self::EntitySearch { kind, exclude, .. } => Self::EntitySearch {
                kind,
                within: Some(scope.into()),
                exclude,
            },
            other => other,
        }
    }

    /// Skip these values in an entity search.
    pub fn excluding(self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        match self {
            Self::EntitySearch { kind, within, .. } => Self::EntitySearch {
                kind,
                within,
                exclude: values.into_iter().map(Into::into).collect(),
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::ExactSearch { .. } => ToolKind::ExactSearch,
            Self::RegexSearch { .. } => ToolKind::RegexSearch,
            Self::ParagraphSearch { .. } => ToolKind::ParagraphSearch,
            Self::EntitySearch { .. } => ToolKind::EntitySearch,
            Self::VerifyQuote { .. } => ToolKind::VerifyQuote,
        }
    }

    /// Human-readable query for the evidence trail.
    pub fn query(&self) -> String {
        match self {
            Self::ExactSearch { text } => text.clone(),
            Self::RegexSearch { pattern, within } => match within {
                Some(_) => format!("{pattern} (scoped)"),
                None => pattern.clone(),
            },
            Self::ParagraphSearch { keywords } => keywords.join(", "),
            Self::EntitySearch { kind, within, .. } => match within {
                Some(_) => format!("{} (scoped)", kind.as_str()),
                None => kind.as_str().to_string(),
            },
            Self::VerifyQuote { quote } => quote.clone(),
        }
    }
}

/// A span the tool found, with surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMatch {
    /// The matched text (capture group 1 for regex searches)
    pub span: String,
    /// Text around the match
    pub context: String,
}

impl ToolMatch {
    pub fn new(span: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            span: span.into(),
            context: context.into(),
        }
    }
}

/// Search tools over a narrative.
#[async_trait]
pub trait SearchToolbox: Send + Sync {
    /// Run one tool call. `Ok(None)` means the tool ran and found nothing.
    async fn invoke(&self, call: &ToolCall, narrative: &str) -> ToolResult<Option<ToolMatch>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_applies_to_searches_only() {
        let call = ToolCall::entity(EntityKind::Date).within("joined in 1985");
        assert!(matches!(call, ToolCall::EntitySearch { within: Some(_), .. }));

        let call = ToolCall::verify("1985").within("ignored");
        assert_eq!(call, ToolCall::verify("1985"));
    }

    #[test]
    fn test_query_rendering() {
        assert_eq!(ToolCall::paragraph(["sold", "house"]).query(), "sold, house");
        assert_eq!(
            ToolCall::entity(EntityKind::Money).within("x").query(),
            "money (scoped)"
        );
        assert_eq!(ToolCall::exact("Meridian").kind(), ToolKind::ExactSearch);
    }

    #[test]
    fn test_entity_kind_for_format() {
        assert_eq!(EntityKind::for_format(FieldFormat::Name), Some(EntityKind::Person));
        assert_eq!(EntityKind::for_format(FieldFormat::Text), None);
    }
}
