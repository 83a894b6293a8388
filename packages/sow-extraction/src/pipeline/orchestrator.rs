//! The pipeline driver.
//!
//! Runs the phases in order, each publishing a whole snapshot of its
//! output into the run state when it completes:
//!
//! 1. Metadata (blocking, degrades to an unknown holder)
//! 2. Parallel extraction dispatch
//! 3. Aggregation, dedup and linking
//! 4. Bounded field search
//! 5. Validation
//! 6. Follow-up hand-off
//!
//! A run timeout or cancellation drops the in-flight phase and assembles
//! the envelope from the last published snapshot.
//!
//! # Example
//!
//! ```rust,ignore
//! let orchestrator = Orchestrator::builder(Arc::new(KnowledgeBase::bundled()?))
//!     .metadata(metadata)
//!     .extractors(extractors)
//!     .revalidator(revalidator)
//!     .config(PipelineConfig::new().with_run_timeout(Duration::from_secs(300)))
//!     .build();
//!
//! let envelope = orchestrator.run(&narrative).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregate::{self, IdAllocator};
use super::assemble::{self, AssemblyInput};
use super::dedup::{self, AliasMap};
use super::dispatch::dispatch_extractors;
use super::followup;
use super::search::{self, FieldSearcher};
use super::validation;
use crate::error::{PipelineError, Result};
use crate::knowledge::KnowledgeBase;
use crate::tools::NarrativeToolbox;
use crate::traits::capability::{Extractor, FollowUpWriter, MetadataExtractor, Revalidator};
use crate::traits::toolbox::SearchToolbox;
use crate::types::config::PipelineConfig;
use crate::types::envelope::{FollowUpItem, PartialRun, Phase, ResultEnvelope, RunWarning};
use crate::types::record::SowRecord;
use crate::types::source::{HolderContext, SourceType};

/// Coordinates the capabilities over one narrative at a time.
pub struct Orchestrator {
    kb: Arc<KnowledgeBase>,
    metadata: Option<Arc<dyn MetadataExtractor>>,
    extractors: Vec<Arc<dyn Extractor>>,
    toolbox: Arc<dyn SearchToolbox>,
    revalidator: Option<Arc<dyn Revalidator>>,
    follow_up: Option<Arc<dyn FollowUpWriter>>,
    config: PipelineConfig,
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    kb: Arc<KnowledgeBase>,
    metadata: Option<Arc<dyn MetadataExtractor>>,
    extractors: Vec<Arc<dyn Extractor>>,
    toolbox: Option<Arc<dyn SearchToolbox>>,
    revalidator: Option<Arc<dyn Revalidator>>,
    follow_up: Option<Arc<dyn FollowUpWriter>>,
    config: PipelineConfig,
}

impl OrchestratorBuilder {
    pub fn metadata(mut self, metadata: Arc<dyn MetadataExtractor>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn extractors(mut self, extractors: impl IntoIterator<Item = Arc<dyn Extractor>>) -> Self {
        self.extractors.extend(extractors);
        self
    }

    /// Replace the default [`NarrativeToolbox`].
    pub fn toolbox(mut self, toolbox: Arc<dyn SearchToolbox>) -> Self {
        self.toolbox = Some(toolbox);
        self
    }

    pub fn revalidator(mut self, revalidator: Arc<dyn Revalidator>) -> Self {
        self.revalidator = Some(revalidator);
        self
    }

    pub fn follow_up(mut self, writer: Arc<dyn FollowUpWriter>) -> Self {
        self.follow_up = Some(writer);
        self
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Orchestrator {
        let uncovered: Vec<SourceType> = SourceType::ALL
            .into_iter()
            .filter(|t| !self.extractors.iter().any(|e| e.source_type() == *t))
            .collect();
        if !uncovered.is_empty() {
            warn!(uncovered = ?uncovered, "No extractor registered for some source types");
        }

        let toolbox = self.toolbox.unwrap_or_else(|| {
            Arc::new(NarrativeToolbox::new().with_context_chars(self.config.search.context_chars))
        });

        Orchestrator {
            kb: self.kb,
            metadata: self.metadata,
            extractors: self.extractors,
            toolbox,
            revalidator: self.revalidator,
            follow_up: self.follow_up,
            config: self.config,
        }
    }
}

/// Snapshot state of a run. Each phase replaces its part whole.
struct RunState {
    phase: Phase,
    metadata: HolderContext,
    metadata_ok: bool,
    extractors_succeeded: usize,
    records: Vec<SowRecord>,
    aliases: AliasMap,
    merges: usize,
    follow_ups: Option<(Vec<FollowUpItem>, Vec<String>)>,
    warnings: Vec<RunWarning>,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: Phase::Metadata,
            metadata: HolderContext::unknown(),
            metadata_ok: false,
            extractors_succeeded: 0,
            records: Vec::new(),
            aliases: AliasMap::default(),
            merges: 0,
            follow_ups: None,
            warnings: Vec::new(),
        }
    }

    fn nothing_succeeded(&self) -> bool {
        !self.metadata_ok && self.extractors_succeeded == 0
    }

    fn fatal(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::Fatal {
            reason: reason.into(),
            partial: Box::new(PartialRun {
                metadata: self.metadata.clone(),
                warnings: self.warnings.clone(),
            }),
        }
    }
}

/// How a run ended.
enum Ending {
    Completed,
    TimedOut(Duration),
    Cancelled,
}

impl Orchestrator {
    pub fn builder(kb: Arc<KnowledgeBase>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            kb,
            metadata: None,
            extractors: Vec::new(),
            toolbox: None,
            revalidator: None,
            follow_up: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Run the whole pipeline over a narrative.
    pub async fn run(&self, narrative: &str) -> Result<ResultEnvelope> {
        self.run_with_cancel(narrative, CancellationToken::new()).await
    }

    /// Run with cooperative cancellation. Cancellation is handled like a
    /// timeout: the envelope is assembled from the last snapshot.
    pub async fn run_with_cancel(
        &self,
        narrative: &str,
        cancel: CancellationToken,
    ) -> Result<ResultEnvelope> {
        if narrative.trim().is_empty() {
            return Err(PipelineError::input("narrative is empty"));
        }

        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        info!(run_id = %run_id, chars = narrative.len(), "Starting extraction run");

        let run_timeout = self.config.timeouts.run_timeout();
        let deadline = async {
            match run_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let mut state = RunState::new();
        let ending = tokio::select! {
            biased;
            _ = cancel.cancelled() => Ending::Cancelled,
            _ = deadline => Ending::TimedOut(run_timeout.unwrap_or_default()),
            result = self.drive(narrative, &mut state) => {
                result?;
                Ending::Completed
            }
        };

        match ending {
            Ending::Completed => {}
            Ending::TimedOut(limit) => {
                warn!(run_id = %run_id, phase = %state.phase, "Run timed out");
                state.warnings.push(RunWarning::new(
                    Phase::Run,
                    format!(
                        "run timed out after {}ms during {} phase",
                        limit.as_millis(),
                        state.phase
                    ),
                ));
            }
            Ending::Cancelled => {
                warn!(run_id = %run_id, phase = %state.phase, "Run cancelled");
                state.warnings.push(RunWarning::new(
                    Phase::Run,
                    format!("run cancelled during {} phase", state.phase),
                ));
            }
        }

        if state.nothing_succeeded() {
            return Err(state.fatal("metadata and every extraction capability failed"));
        }

        let (follow_ups, follow_up_questions) = match state.follow_ups.take() {
            Some(done) => done,
            None => {
                let items = followup::follow_up_items(&state.records);
                let questions =
                    followup::fallback_questions(&state.records, &self.kb, &self.config.follow_up);
                (items, questions)
            }
        };

        let envelope = assemble::assemble(AssemblyInput {
            run_id,
            started_at,
            metadata: state.metadata,
            records: state.records,
            retired_ids: state.aliases.into_inner(),
            merges: state.merges,
            follow_ups,
            follow_up_questions,
            warnings: state.warnings,
        });

        info!(
            run_id = %run_id,
            records = envelope.summary.total_sources_identified,
            complete = envelope.summary.fully_complete_sources,
            completeness = envelope.summary.overall_completeness_score,
            warnings = envelope.warnings.len(),
            "Extraction run finished"
        );
        Ok(envelope)
    }

    /// Drive the phases, publishing each one's output into `state` only
    /// once the phase is done.
    async fn drive(&self, narrative: &str, state: &mut RunState) -> Result<()> {
        let retry = &self.config.retry;
        let call_timeout = self.config.timeouts.call_timeout();

        // Metadata
        state.phase = Phase::Metadata;
        if let Some(metadata) = &self.metadata {
            match retry
                .run("metadata", Some(call_timeout), || {
                    metadata.extract_metadata(narrative)
                })
                .await
            {
                Ok(holder) => {
                    debug!(holder = ?holder.holder_name, joint = holder.is_joint(), "Metadata extracted");
                    state.metadata = holder;
                    state.metadata_ok = true;
                }
                Err(e) => {
                    warn!(error = %e, "Metadata extraction failed, continuing with unknown holder");
                    state.warnings.push(RunWarning::new(
                        Phase::Metadata,
                        format!("metadata extraction failed: {e}"),
                    ));
                }
            }
        } else {
            debug!("No metadata extractor configured");
        }

        // Extraction
        state.phase = Phase::Extraction;
        let dispatch = dispatch_extractors(
            &self.extractors,
            narrative,
            &state.metadata,
            retry,
            call_timeout,
        )
        .await;
        state.warnings.extend(dispatch.warnings);
        state.extractors_succeeded = dispatch.succeeded;
        if state.nothing_succeeded() {
            return Err(state.fatal("metadata and every extraction capability failed"));
        }

        // Aggregation and dedup
        state.phase = Phase::Aggregation;
        let mut ids = IdAllocator::new();
        let records = aggregate::aggregate(dispatch.candidates, &self.kb, &mut ids);
        let deduped = dedup::deduplicate(
            records,
            narrative,
            &state.metadata,
            &self.kb,
            &self.config.dedup,
        );
        state.records = deduped.records;
        state.aliases = deduped.aliases;
        state.merges = deduped.merges;

        // Field search
        state.phase = Phase::Search;
        let searching = search::begin_search(&mut state.records);
        debug!(fields = searching, "Field search started");
        let holder_names = state.metadata.holder_names();
        let searcher = FieldSearcher::new(
            self.toolbox.as_ref(),
            narrative,
            &self.config.search,
            retry,
        )
        .with_holder_names(holder_names);
        let (records, warnings) = searcher.recover(&state.records, &self.kb).await;
        state.records = records;
        state.warnings.extend(warnings);

        // Validation
        state.phase = Phase::Validation;
        let validated = validation::validate_records(
            &state.records,
            narrative,
            self.revalidator.as_deref(),
            &self.kb,
            &self.config.validation,
            retry,
            call_timeout,
        )
        .await;
        state.records = validated.records;
        state.warnings.extend(validated.warnings);

        // Follow-up
        state.phase = Phase::FollowUp;
        let items = followup::follow_up_items(&state.records);
        let (questions, warning) = followup::phrase_questions(
            self.follow_up.as_deref(),
            &state.metadata,
            &state.records,
            &items,
            &self.kb,
            &self.config.follow_up,
            retry,
            call_timeout,
        )
        .await;
        state.warnings.extend(warning);
        state.follow_ups = Some((items, questions));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockExtractor, MockMetadata, TestScenario};
    use crate::types::record::CandidateRecord;

    #[tokio::test]
    async fn test_empty_narrative_rejected() {
        let orchestrator = TestScenario::new().build();
        let err = orchestrator.run("   \n").await.unwrap_err();
        assert!(matches!(err, PipelineError::Input { .. }));
    }

    #[tokio::test]
    async fn test_metadata_failure_degrades() {
        let orchestrator = TestScenario::new()
            .with_metadata(MockMetadata::failing())
            .with_extractor(MockExtractor::new(SourceType::Gift).with_candidate(
                CandidateRecord::new(SourceType::Gift).with_field("donor_name", "Margaret Hill"),
            ))
            .build();

        let envelope = orchestrator
            .run("My grandmother Margaret Hill gave me money.")
            .await
            .unwrap();
        assert_eq!(envelope.metadata.holder_name.as_deref(), Some("Unknown"));
        assert!(envelope.has_warning(Phase::Metadata));
        assert_eq!(envelope.sources_of_wealth.len(), 1);
    }

    #[tokio::test]
    async fn test_everything_failing_is_fatal() {
        let orchestrator = TestScenario::new()
            .with_metadata(MockMetadata::failing())
            .all_failing()
            .build();

        let err = orchestrator.run("Some narrative.").await.unwrap_err();
        let partial = err.partial().unwrap();
        assert_eq!(partial.metadata.holder_name.as_deref(), Some("Unknown"));
        assert_eq!(
            partial
                .warnings
                .iter()
                .filter(|w| w.phase == Phase::Extraction)
                .count(),
            11
        );
    }

    #[tokio::test]
    async fn test_cancel_before_any_phase_is_fatal() {
        let orchestrator = TestScenario::new()
            .with_metadata(MockMetadata::new(HolderContext::individual("Jane Smith")))
            .build();
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Cancelled before metadata finished: nothing succeeded yet.
        let err = orchestrator
            .run_with_cancel("Some narrative.", cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fatal { .. }));
    }
}
