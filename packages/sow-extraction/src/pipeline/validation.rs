//! Validation selector and re-extraction trigger.
//!
//! Records that are thin, still missing fields after the search loop, or
//! carry values the narrative does not support are sent back to a
//! higher-cost re-extraction capability together with their field-format
//! constraints.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::completeness;
use super::grounding;
use crate::knowledge::KnowledgeBase;
use crate::traits::capability::{FieldUpdates, Revalidator};
use crate::types::config::{RetryPolicy, ValidationConfig};
use crate::types::envelope::{Phase, RunWarning};
use crate::types::evidence::EvidenceEntry;
use crate::types::record::{FieldOrigin, SowRecord, ValidationStatus};

/// Why a record was selected for re-extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionReason {
    LowCompleteness(f64),
    ExhaustedFields(Vec<String>),
    Ungrounded(Vec<String>),
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionReason::LowCompleteness(score) => {
                write!(f, "completeness {score:.2} below threshold")
            }
            SelectionReason::ExhaustedFields(fields) => {
                write!(f, "search exhausted for {}", fields.join(", "))
            }
            SelectionReason::Ungrounded(fields) => {
                write!(f, "values not found in narrative: {}", fields.join(", "))
            }
        }
    }
}

/// Reasons a record needs re-extraction; empty when it does not.
pub fn selection_reasons(
    record: &SowRecord,
    narrative: &str,
    kb: &KnowledgeBase,
    config: &ValidationConfig,
) -> Vec<SelectionReason> {
    let mut reasons = Vec::new();

    if record.completeness_score < config.completeness_threshold {
        reasons.push(SelectionReason::LowCompleteness(record.completeness_score));
    }

    let exhausted: Vec<String> = record
        .exhausted_fields()
        .into_iter()
        .map(String::from)
        .collect();
    if !exhausted.is_empty() {
        reasons.push(SelectionReason::ExhaustedFields(exhausted));
    }

    if config.check_grounding {
        let ungrounded = grounding::ungrounded_fields(record, narrative, kb);
        if !ungrounded.is_empty() {
            reasons.push(SelectionReason::Ungrounded(ungrounded));
        }
    }

    reasons
}

/// Result of the validation pass.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub records: Vec<SowRecord>,
    pub warnings: Vec<RunWarning>,
    pub selected: usize,
}

/// Run the validation pass over every record. Selected records are
/// re-extracted concurrently; the rest keep `unvalidated`.
pub async fn validate_records(
    records: &[SowRecord],
    narrative: &str,
    revalidator: Option<&dyn Revalidator>,
    kb: &KnowledgeBase,
    config: &ValidationConfig,
    retry: &RetryPolicy,
    call_timeout: Duration,
) -> ValidationOutcome {
    let selections: Vec<Vec<SelectionReason>> = records
        .iter()
        .map(|r| selection_reasons(r, narrative, kb, config))
        .collect();
    let selected = selections.iter().filter(|s| !s.is_empty()).count();

    let Some(revalidator) = revalidator else {
        if selected > 0 {
            debug!(selected, "No revalidator configured, skipping validation");
        }
        return ValidationOutcome {
            records: records.to_vec(),
            warnings: Vec::new(),
            selected,
        };
    };

    let calls = records.iter().zip(&selections).map(|(record, reasons)| async move {
        if reasons.is_empty() {
            return None;
        }
        let operation = format!("revalidate {}", record.source_id);
        let constraints = kb.constraints(record.source_type);
        let result = retry
            .run(&operation, Some(call_timeout), || {
                revalidator.revalidate(narrative, record, &constraints)
            })
            .await;
        Some(result)
    });
    let results = join_all(calls).await;

    let mut outcome = ValidationOutcome {
        selected,
        ..Default::default()
    };
    for ((record, reasons), result) in records.iter().zip(selections).zip(results) {
        let mut record = record.clone();
        match result {
            None => {}
            Some(Ok(updates)) => {
                for reason in &reasons {
                    record.notes.push(format!("Revalidated: {reason}"));
                }
                apply_updates(&mut record, updates, kb);
            }
            Some(Err(e)) => {
                warn!(source_id = %record.source_id, error = %e, "Revalidation failed");
                record.validation_status = ValidationStatus::Unresolved;
                outcome.warnings.push(
                    RunWarning::new(Phase::Validation, format!("revalidation failed: {e}"))
                        .about(record.source_id.to_string()),
                );
            }
        }
        outcome.records.push(record);
    }

    info!(
        records = outcome.records.len(),
        selected = outcome.selected,
        failed = outcome.warnings.len(),
        "Validation pass complete"
    );
    outcome
}

/// Apply a re-extraction answer. Nulls never clear a value; unknown
/// fields are kept as supplementary. Sets the final status.
pub fn apply_updates(record: &mut SowRecord, updates: FieldUpdates, kb: &KnowledgeBase) {
    for (field, value) in updates.fields {
        let Some(value) = value else {
            continue;
        };
        let before = record.value(&field).map(String::from);
        let replaced = record.set_field(&field, Some(value), FieldOrigin::Validated);
        let after = record.value(&field).map(String::from);

        if let Some(old) = replaced {
            record.evidence.push(EvidenceEntry::note(
                &field,
                format!("validation replaced {old:?}"),
            ));
        } else if before.is_none() && after.is_some() {
            record
                .evidence
                .push(EvidenceEntry::note(&field, "validation filled missing value"));
        }
    }

    if let Some(reasoning) = updates.reasoning {
        record.notes.push(reasoning);
    }

    completeness::refresh(record, kb);
    record.validation_status = if record.missing_fields.is_empty() {
        ValidationStatus::Validated
    } else {
        ValidationStatus::Unresolved
    };
    debug!(
        source_id = %record.source_id,
        status = ?record.validation_status,
        completeness = record.completeness_score,
        "Applied revalidation"
    );
}
