//! Candidate and aggregated source-of-wealth records.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::evidence::EvidenceTrail;
use super::source::SourceType;

/// Stable record identifier, rendered as `SOW_001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SourceId(u32);

impl SourceId {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SOW_{:03}", self.0)
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.to_string()
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("SOW_")
            .and_then(|n| n.parse().ok())
            .map(SourceId)
            .ok_or_else(|| format!("invalid source id: {s}"))
    }
}

impl TryFrom<String> for SourceId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    /// Capability name
    pub capability: String,
    /// Index of the capability in the orchestrator's registry
    pub capability_index: usize,
    /// Position within that capability's output
    pub position: usize,
}

impl Provenance {
    /// Canonical sort key (type order is applied by the caller).
    pub fn sort_key(&self) -> (usize, usize) {
        (self.capability_index, self.position)
    }
}

/// A record as returned by one extraction capability, before IDs and dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CandidateRecord {
    pub source_type: SourceType,

    /// Field values; `null` means the capability could not find the value
    #[serde(default)]
    pub fields: IndexMap<String, Option<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Filled in by dispatch; capabilities may leave it empty
    #[serde(default)]
    #[schemars(skip)]
    pub provenance: Provenance,
}

impl CandidateRecord {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            fields: IndexMap::new(),
            description: None,
            provenance: Provenance::default(),
        }
    }

    /// Set a populated field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Some(value.into()));
        self
    }

    /// Set a field the capability explicitly could not find.
    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// How a field value was obtained. Ordered by confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrigin {
    Extracted,
    SearchRecovered,
    Validated,
}

/// A field value and its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Option<String>,
    pub origin: FieldOrigin,
}

impl FieldValue {
    pub fn extracted(value: Option<String>) -> Self {
        Self {
            value: normalize_value(value),
            origin: FieldOrigin::Extracted,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.value.is_some()
    }
}

/// Empty and whitespace-only strings count as null.
pub fn normalize_value(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Per-field search state machine: `pending -> searching -> {recovered, exhausted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Pending,
    Searching,
    Recovered,
    Exhausted,
}

/// A required field that has no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingField {
    pub field_name: String,
    pub reason: String,
    pub search_state: SearchState,
}

/// Whether the record went through the re-extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    Unvalidated,
    Validated,
    Unresolved,
}

/// Which joint holder a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "holder", rename_all = "snake_case")]
pub enum Attribution {
    Holder(String),
    Ambiguous,
}

/// An aggregated record: a candidate after ID assignment and dedup, mutated
/// by the search loop and validation, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SowRecord {
    pub source_id: SourceId,
    pub source_type: SourceType,
    pub description: String,
    pub fields: IndexMap<String, FieldValue>,
    pub missing_fields: Vec<MissingField>,
    pub completeness_score: f64,
    pub links: BTreeSet<SourceId>,
    pub validation_status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<Attribution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compliance_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Identifiers retired into this record by dedup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub absorbed: Vec<SourceId>,
    pub provenance: Vec<Provenance>,
    pub evidence: EvidenceTrail,
}

impl SowRecord {
    /// Populated value of a field.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|f| f.value.as_deref())
    }

    pub fn is_populated(&self, field: &str) -> bool {
        self.value(field).is_some()
    }

    pub fn origin(&self, field: &str) -> Option<FieldOrigin> {
        self.fields
            .get(field)
            .filter(|f| f.is_populated())
            .map(|f| f.origin)
    }

    /// Fill or overwrite a field. A null never removes a populated value.
    ///
    /// Returns the previous value when it was replaced by a different one.
    pub fn set_field(
        &mut self,
        field: &str,
        value: Option<String>,
        origin: FieldOrigin,
    ) -> Option<String> {
        let Some(value) = normalize_value(value) else {
            self.fields
                .entry(field.to_string())
                .or_insert(FieldValue {
                    value: None,
                    origin,
                });
            return None;
        };

        let slot = self.fields.entry(field.to_string()).or_insert(FieldValue {
            value: None,
            origin,
        });
        let previous = slot.value.replace(value);
        slot.origin = origin;
        previous.filter(|p| Some(p) != slot.value.as_ref())
    }

    pub fn missing(&self, field: &str) -> Option<&MissingField> {
        self.missing_fields.iter().find(|m| m.field_name == field)
    }

    /// Names of required fields the search loop gave up on.
    pub fn exhausted_fields(&self) -> Vec<&str> {
        self.missing_fields
            .iter()
            .filter(|m| m.search_state == SearchState::Exhausted)
            .map(|m| m.field_name.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty()
    }

    /// All text a record carries: description then populated values.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.description.as_str())
            .chain(self.fields.values().filter_map(|f| f.value.as_deref()))
    }
}
