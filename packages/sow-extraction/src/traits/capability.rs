//! Capability traits for the reasoning steps the pipeline coordinates.
//!
//! The pipeline never reasons about a narrative itself. Applications plug
//! in implementations (LLM-backed, rule-based, replayed fixtures) for:
//! - Metadata extraction (who holds the account)
//! - Per-type extraction (one implementation per source type)
//! - Re-extraction of flagged records
//! - Phrasing follow-up questions

use async_trait::async_trait;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityResult;
use crate::knowledge::FieldConstraints;
use crate::types::envelope::FollowUpItem;
use crate::types::record::{CandidateRecord, SowRecord};
use crate::types::source::{HolderContext, SourceType};

/// Extracts candidate records of one source type from a narrative.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// The source type this capability is responsible for.
    fn source_type(&self) -> SourceType;

    /// Name used in provenance and warnings.
    fn name(&self) -> String {
        format!("{}_extractor", self.source_type())
    }

    /// Return every candidate of this type found in the narrative, in the
    /// order they appear. Empty when the type is absent.
    async fn extract(
        &self,
        narrative: &str,
        holder: &HolderContext,
    ) -> CapabilityResult<Vec<CandidateRecord>>;
}

/// Extracts account-holder context.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract_metadata(&self, narrative: &str) -> CapabilityResult<HolderContext>;
}

/// Answer from a re-extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldUpdates {
    /// Field name -> corrected or newly found value. Null leaves the field
    /// as it was.
    #[serde(default)]
    pub fields: IndexMap<String, Option<String>>,

    /// Optional explanation, kept in the record notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl FieldUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), Some(value.into()));
        self
    }

    pub fn with_null(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), None);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Higher-cost re-extraction for records the validation selector flags.
#[async_trait]
pub trait Revalidator: Send + Sync {
    /// Re-read the narrative for one record, constrained to its field
    /// formats. May add or correct values.
    async fn revalidate(
        &self,
        narrative: &str,
        record: &SowRecord,
        constraints: &FieldConstraints,
    ) -> CapabilityResult<FieldUpdates>;
}

/// Turns the missing-field list into questions for the client.
#[async_trait]
pub trait FollowUpWriter: Send + Sync {
    async fn phrase_questions(
        &self,
        holder: &HolderContext,
        items: &[FollowUpItem],
    ) -> CapabilityResult<Vec<String>>;
}
