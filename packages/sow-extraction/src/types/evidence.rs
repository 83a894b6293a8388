//! Evidence trail: the append-only log of how each field value was found
//! (or why it was not).

use serde::{Deserialize, Serialize};

/// The search tools available to the field-search loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ExactSearch,
    RegexSearch,
    ParagraphSearch,
    EntitySearch,
    VerifyQuote,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::ExactSearch => "exact_search",
            ToolKind::RegexSearch => "regex_search",
            ToolKind::ParagraphSearch => "paragraph_search",
            ToolKind::EntitySearch => "entity_search",
            ToolKind::VerifyQuote => "verify_quote",
        }
    }
}

/// What an evidence entry recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceOutcome {
    /// The tool returned a span
    Match,
    /// The tool ran and found nothing
    NoMatch,
    /// A quote was confirmed verbatim in the narrative
    Verified,
    /// A quote could not be found verbatim
    Rejected,
    /// The tool failed
    Error,
    /// Bookkeeping: merge conflicts, validation corrections
    Note,
}

/// One entry in a record's evidence trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolKind>,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub outcome: EvidenceOutcome,
}

impl EvidenceEntry {
    /// Record a tool invocation.
    pub fn tool(
        field: impl Into<String>,
        tool: ToolKind,
        query: impl Into<String>,
        result: Option<String>,
        outcome: EvidenceOutcome,
    ) -> Self {
        Self {
            field: field.into(),
            tool: Some(tool),
            query: query.into(),
            result,
            outcome,
        }
    }

    /// Record a note that is not a tool invocation.
    pub fn note(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            tool: None,
            query: text.into(),
            result: None,
            outcome: EvidenceOutcome::Note,
        }
    }

    pub fn is_invocation(&self) -> bool {
        self.tool.is_some()
    }
}

/// Append-only ordered sequence of evidence entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceTrail(Vec<EvidenceEntry>);

impl EvidenceTrail {
    pub fn push(&mut self, entry: EvidenceEntry) {
        self.0.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = EvidenceEntry>) {
        self.0.extend(entries);
    }

    pub fn entries(&self) -> &[EvidenceEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries about one field, in order.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a EvidenceEntry> {
        self.0.iter().filter(move |e| e.field == field)
    }

    /// Number of tool invocations logged for a field.
    pub fn invocations(&self, field: &str) -> usize {
        self.for_field(field).filter(|e| e.is_invocation()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_counts_only_invocations() {
        let mut trail = EvidenceTrail::default();
        trail.push(EvidenceEntry::tool(
            "sale_date",
            ToolKind::RegexSearch,
            "(?i)sold",
            None,
            EvidenceOutcome::NoMatch,
        ));
        trail.push(EvidenceEntry::note("sale_date", "merged from SOW_002"));
        trail.push(EvidenceEntry::tool(
            "sale_proceeds",
            ToolKind::EntitySearch,
            "money",
            Some("£450,000".into()),
            EvidenceOutcome::Match,
        ));

        assert_eq!(trail.len(), 3);
        assert_eq!(trail.invocations("sale_date"), 1);
        assert_eq!(trail.for_field("sale_date").count(), 2);
    }

    #[test]
    fn test_trail_serializes_as_list() {
        let mut trail = EvidenceTrail::default();
        trail.push(EvidenceEntry::note("gift_date", "kept canonical value"));
        let json = serde_json::to_value(&trail).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["outcome"], "note");
        assert!(json[0].get("tool").is_none());
    }
}
