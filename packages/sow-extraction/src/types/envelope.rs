//! The result envelope emitted by a pipeline run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{SourceId, SowRecord};
use super::source::HolderContext;

/// Pipeline phase a warning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Metadata,
    Extraction,
    Aggregation,
    Search,
    Validation,
    FollowUp,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Metadata => "metadata",
            Phase::Extraction => "extraction",
            Phase::Aggregation => "aggregation",
            Phase::Search => "search",
            Phase::Validation => "validation",
            Phase::FollowUp => "follow_up",
            Phase::Run => "run",
        };
        f.write_str(s)
    }
}

/// A recoverable problem encountered during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWarning {
    pub phase: Phase,
    /// Capability or record the warning is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

impl RunWarning {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            subject: None,
            message: message.into(),
        }
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// A missing field handed to follow-up generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpItem {
    pub source_id: SourceId,
    pub field_name: String,
    pub reason: String,
}

/// Run-level summary numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_sources_identified: usize,
    pub fully_complete_sources: usize,
    pub sources_with_missing_fields: usize,
    pub overall_completeness_score: f64,
    pub overlap_links: usize,
    pub merges_performed: usize,
}

/// The single output of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub metadata: HolderContext,
    pub sources_of_wealth: Vec<SowRecord>,
    pub summary: Summary,
    pub follow_ups: Vec<FollowUpItem>,
    pub follow_up_questions: Vec<String>,
    /// Retired identifier -> canonical identifier
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub retired_ids: BTreeMap<SourceId, SourceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RunWarning>,
}

impl ResultEnvelope {
    /// Find a record by id, following retired ids to their canonical record.
    pub fn record(&self, id: SourceId) -> Option<&SowRecord> {
        let id = self.resolve(id);
        self.sources_of_wealth.iter().find(|r| r.source_id == id)
    }

    /// Canonical id for a possibly-retired id.
    pub fn resolve(&self, id: SourceId) -> SourceId {
        let mut current = id;
        while let Some(next) = self.retired_ids.get(&current) {
            current = *next;
        }
        current
    }

    /// Distinct overlap links as ordered pairs.
    pub fn overlap_pairs(&self) -> Vec<(SourceId, SourceId)> {
        let mut pairs: Vec<(SourceId, SourceId)> = self
            .sources_of_wealth
            .iter()
            .flat_map(|r| r.links.iter().map(move |l| (r.source_id.min(*l), r.source_id.max(*l))))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    pub fn has_warning(&self, phase: Phase) -> bool {
        self.warnings.iter().any(|w| w.phase == phase)
    }
}

/// State carried by a fatal error: what we knew when everything failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRun {
    pub metadata: HolderContext,
    pub warnings: Vec<RunWarning>,
}
