//! Parallel extraction dispatch: one future per capability, joined by a
//! barrier, each isolated behind its own retry and timeout.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::CapabilityResult;
use crate::traits::capability::Extractor;
use crate::types::config::RetryPolicy;
use crate::types::envelope::{Phase, RunWarning};
use crate::types::record::{CandidateRecord, Provenance};
use crate::types::source::HolderContext;

/// Result of fanning out to every extractor.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Candidates from every capability that succeeded, with provenance set
    pub candidates: Vec<CandidateRecord>,
    pub warnings: Vec<RunWarning>,
    /// Capabilities that returned (possibly empty) output
    pub succeeded: usize,
    /// Capabilities that failed after retries
    pub failed: usize,
}

impl DispatchOutcome {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0
    }
}

/// Invoke every extractor concurrently and collect their candidates.
///
/// A failing extractor contributes nothing but a warning. Candidates of a
/// different source type than the extractor's are dropped.
pub async fn dispatch_extractors(
    extractors: &[Arc<dyn Extractor>],
    narrative: &str,
    holder: &HolderContext,
    retry: &RetryPolicy,
    call_timeout: Duration,
) -> DispatchOutcome {
    let futures = extractors.iter().enumerate().map(|(index, extractor)| {
        let name = extractor.name();
        async move {
            let result: CapabilityResult<Vec<CandidateRecord>> = retry
                .run(&name, Some(call_timeout), || extractor.extract(narrative, holder))
                .await;
            (index, name, extractor.source_type(), result)
        }
    });

    let results = join_all(futures).await;

    let mut outcome = DispatchOutcome::default();
    for (index, name, source_type, result) in results {
        match result {
            Ok(candidates) => {
                outcome.succeeded += 1;
                debug!(capability = %name, count = candidates.len(), "Extractor returned");

                for (position, mut candidate) in candidates.into_iter().enumerate() {
                    if candidate.source_type != source_type {
                        warn!(
                            capability = %name,
                            expected = %source_type,
                            got = %candidate.source_type,
                            "Dropping candidate of foreign source type"
                        );
                        outcome.warnings.push(
                            RunWarning::new(
                                Phase::Extraction,
                                format!(
                                    "dropped {} candidate returned by {} extractor",
                                    candidate.source_type, source_type
                                ),
                            )
                            .about(name.clone()),
                        );
                        continue;
                    }
                    candidate.provenance = Provenance {
                        capability: name.clone(),
                        capability_index: index,
                        position,
                    };
                    outcome.candidates.push(candidate);
                }
            }
            Err(e) => {
                outcome.failed += 1;
                warn!(capability = %name, error = %e, "Extractor failed");
                outcome.warnings.push(
                    RunWarning::new(Phase::Extraction, format!("extractor failed: {e}"))
                        .about(name),
                );
            }
        }
    }

    info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        candidates = outcome.candidates.len(),
        "Extraction dispatch complete"
    );
    outcome
}
