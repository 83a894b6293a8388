//! Capabilities that replay recorded answers from a JSON fixture.
//!
//! Lets an operator run the whole pipeline over a narrative without a
//! reasoning backend:
//!
//! ```json
//! {
//!   "metadata": { "holder_name": "Emma Hill", "account_type": "individual" },
//!   "candidates": {
//!     "gift": [{ "fields": { "donor_name": "Margaret Hill" } }]
//!   },
//!   "failing": ["lottery_winnings"],
//!   "revalidations": { "SOW_001": { "fields": { "gift_date": "2019" } } },
//!   "follow_up_questions": ["When did Margaret Hill give you the money?"]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use sow_extraction::{
    CandidateRecord, CapabilityError, CapabilityResult, Extractor, FieldConstraints,
    FieldUpdates, FollowUpItem, FollowUpWriter, HolderContext, MetadataExtractor,
    OrchestratorBuilder, Revalidator, SourceType, SowRecord,
};

/// One recorded candidate; the source type comes from its map key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordedCandidate {
    #[serde(default)]
    pub fields: IndexMap<String, Option<String>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Recorded capability answers for one narrative.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    /// Metadata answer. Absent means no metadata capability.
    #[serde(default)]
    pub metadata: Option<HolderContext>,

    /// Make the metadata capability fail instead.
    #[serde(default)]
    pub metadata_fails: bool,

    #[serde(default)]
    pub candidates: IndexMap<SourceType, Vec<RecordedCandidate>>,

    /// Source types whose extractor fails.
    #[serde(default)]
    pub failing: Vec<SourceType>,

    /// Re-extraction answers keyed by record id.
    #[serde(default)]
    pub revalidations: Option<IndexMap<String, FieldUpdates>>,

    #[serde(default)]
    pub follow_up_questions: Option<Vec<String>>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Fixture {} is not valid JSON", path.display()))
    }

    /// Register one replaying capability per recorded concern.
    pub fn install(self, mut builder: OrchestratorBuilder) -> OrchestratorBuilder {
        if self.metadata_fails {
            builder = builder.metadata(Arc::new(ReplayMetadata { answer: None }));
        } else if let Some(holder) = self.metadata {
            builder = builder.metadata(Arc::new(ReplayMetadata {
                answer: Some(holder),
            }));
        }

        let mut candidates = self.candidates;
        for source_type in SourceType::ALL {
            let recorded = candidates.shift_remove(&source_type).unwrap_or_default();
            builder = builder.extractor(Arc::new(ReplayExtractor {
                source_type,
                candidates: recorded
                    .into_iter()
                    .map(|c| CandidateRecord {
                        fields: c.fields,
                        description: c.description,
                        ..CandidateRecord::new(source_type)
                    })
                    .collect(),
                fails: self.failing.contains(&source_type),
            }));
        }

        if let Some(answers) = self.revalidations {
            builder = builder.revalidator(Arc::new(ReplayRevalidator { answers }));
        }
        if let Some(questions) = self.follow_up_questions {
            builder = builder.follow_up(Arc::new(ReplayFollowUp { questions }));
        }
        builder
    }
}

struct ReplayMetadata {
    answer: Option<HolderContext>,
}

#[async_trait]
impl MetadataExtractor for ReplayMetadata {
    async fn extract_metadata(&self, _narrative: &str) -> CapabilityResult<HolderContext> {
        self.answer
            .clone()
            .ok_or_else(|| CapabilityError::failed("fixture marks metadata as failing"))
    }
}

struct ReplayExtractor {
    source_type: SourceType,
    candidates: Vec<CandidateRecord>,
    fails: bool,
}

#[async_trait]
impl Extractor for ReplayExtractor {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    fn name(&self) -> String {
        format!("replay_{}", self.source_type)
    }

    async fn extract(
        &self,
        _narrative: &str,
        _holder: &HolderContext,
    ) -> CapabilityResult<Vec<CandidateRecord>> {
        if self.fails {
            return Err(CapabilityError::failed(format!(
                "fixture marks {} as failing",
                self.source_type
            )));
        }
        Ok(self.candidates.clone())
    }
}

struct ReplayRevalidator {
    answers: IndexMap<String, FieldUpdates>,
}

#[async_trait]
impl Revalidator for ReplayRevalidator {
    async fn revalidate(
        &self,
        _narrative: &str,
        record: &SowRecord,
        _constraints: &FieldConstraints,
    ) -> CapabilityResult<FieldUpdates> {
        Ok(self
            .answers
            .get(&record.source_id.to_string())
            .cloned()
            .unwrap_or_default())
    }
}

struct ReplayFollowUp {
    questions: Vec<String>,
}

#[async_trait]
impl FollowUpWriter for ReplayFollowUp {
    async fn phrase_questions(
        &self,
        _holder: &HolderContext,
        _items: &[FollowUpItem],
    ) -> CapabilityResult<Vec<String>> {
        Ok(self.questions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sow_extraction::{KnowledgeBase, Orchestrator, Phase};

    const FIXTURE: &str = r#"{
        "metadata": { "holder_name": "Emma Hill", "account_type": "individual" },
        "candidates": {
            "gift": [{ "fields": { "donor_name": "Margaret Hill", "gift_value": "£100,000" } }]
        },
        "failing": ["lottery_winnings"]
    }"#;

    #[test]
    fn test_fixture_parses() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(
            fixture.metadata.unwrap().holder_name.as_deref(),
            Some("Emma Hill")
        );
        assert_eq!(fixture.candidates[&SourceType::Gift].len(), 1);
        assert_eq!(fixture.failing, vec![SourceType::LotteryWinnings]);
        assert!(fixture.revalidations.is_none());
    }

    #[tokio::test]
    async fn test_replayed_run() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        let kb = Arc::new(KnowledgeBase::bundled().unwrap());
        let orchestrator = fixture.install(Orchestrator::builder(kb)).build();

        let envelope = orchestrator
            .run("My grandmother Margaret Hill gave me £100,000.")
            .await
            .unwrap();
        assert_eq!(envelope.sources_of_wealth.len(), 1);
        assert_eq!(envelope.sources_of_wealth[0].source_type, SourceType::Gift);
        assert!(envelope
            .warnings
            .iter()
            .any(|w| w.phase == Phase::Extraction));
    }
}
