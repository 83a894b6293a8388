//! Bounded field-search loop.
//!
//! Each missing required field runs a small state machine,
//! `pending -> searching -> {recovered, exhausted}`, with a hard ceiling on
//! tool invocations. The only way to reach `recovered` is a candidate
//! span that passes quote verification and is a literal substring of the
//! narrative.
//!
//! Query planning, in order, until the budget runs out:
//! 1. A cue-anchored regex for the field format ("joined ... (DATE)")
//! 2. Scope to a known entity of the record, then entity-search inside it
//! 3. Scope to the passage that best matches the field cues, then
//!    entity-search inside it
//!
//! Every candidate is followed by a `verify_quote` call.

use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::completeness::{self, REASON_INHERITED_PROPERTY};
use crate::knowledge::{FieldFormat, FieldSpec, KnowledgeBase};
use crate::text;
use crate::tools::patterns::cue_anchored;
use crate::traits::toolbox::{EntityKind, SearchToolbox, ToolCall, ToolMatch};
use crate::types::config::{RetryPolicy, SearchConfig};
use crate::types::envelope::{Phase, RunWarning};
use crate::types::evidence::{EvidenceEntry, EvidenceOutcome, ToolKind};
use crate::types::record::{FieldOrigin, MissingField, SearchState, SowRecord};

/// Generic words left out of passage-search keywords.
const FIELD_NAME_NOISE: &[&str] = &["name", "date", "of", "to", "from", "amount", "original"];

/// Why a field ended up exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExhaustReason {
    /// The invocation ceiling was reached
    CeilingReached,
    /// Every query ran without a verified value
    NoVerifiedValue,
    /// A tool failed
    ToolFailed(String),
}

/// Terminal outcome for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Recovered(String),
    Exhausted(ExhaustReason),
}

/// Result of searching one field.
#[derive(Debug, Clone)]
pub struct FieldSearchResult {
    pub field: String,
    pub outcome: SearchOutcome,
    pub invocations: usize,
    pub evidence: Vec<EvidenceEntry>,
}

impl FieldSearchResult {
    pub fn state(&self) -> SearchState {
        match self.outcome {
            SearchOutcome::Recovered(_) => SearchState::Recovered,
            SearchOutcome::Exhausted(_) => SearchState::Exhausted,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match &self.outcome {
            SearchOutcome::Recovered(v) => Some(v),
            SearchOutcome::Exhausted(_) => None,
        }
    }
}

/// Why the loop stopped early.
enum Halt {
    Budget,
    Tool(String),
}

/// Runs searches for missing fields against one narrative.
pub struct FieldSearcher<'a> {
    toolbox: &'a dyn SearchToolbox,
    narrative: &'a str,
    ceiling: usize,
    retry: &'a RetryPolicy,
    holder_names: Vec<String>,
}

impl<'a> FieldSearcher<'a> {
    pub fn new(
        toolbox: &'a dyn SearchToolbox,
        narrative: &'a str,
        config: &SearchConfig,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            toolbox,
            narrative,
            ceiling: config.ceiling(),
            retry,
            holder_names: Vec::new(),
        }
    }

    /// Names that entity searches should skip.
    pub fn with_holder_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.holder_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Search one missing field of a record.
    pub async fn search_field(&self, record: &SowRecord, spec: &FieldSpec) -> FieldSearchResult {
        let mut run = FieldRun {
            searcher: self,
            field: &spec.name,
            invocations: 0,
            evidence: Vec::new(),
        };

        let outcome = match run.plan(record, spec).await {
            Ok(Some(value)) => SearchOutcome::Recovered(value),
            Ok(None) => SearchOutcome::Exhausted(ExhaustReason::NoVerifiedValue),
            Err(Halt::Budget) => SearchOutcome::Exhausted(ExhaustReason::CeilingReached),
            Err(Halt::Tool(e)) => SearchOutcome::Exhausted(ExhaustReason::ToolFailed(e)),
        };
        match &outcome {
            SearchOutcome::Recovered(value) => info!(
                source_id = %record.source_id,
                field = %spec.name,
                value = %value,
                invocations = run.invocations,
                "Recovered missing field"
            ),
            SearchOutcome::Exhausted(reason) => debug!(
                source_id = %record.source_id,
                field = %spec.name,
                reason = ?reason,
                invocations = run.invocations,
                "Field search exhausted"
            ),
        }

        FieldSearchResult {
            field: spec.name.clone(),
            outcome,
            invocations: run.invocations,
            evidence: run.evidence,
        }
    }

    /// Search every pending missing field of a record concurrently.
    pub async fn search_record(
        &self,
        record: &SowRecord,
        kb: &KnowledgeBase,
    ) -> Vec<FieldSearchResult> {
        let specs: Vec<&FieldSpec> = record
            .missing_fields
            .iter()
            .filter(|m| is_searchable(m))
            .filter_map(|m| kb.field(record.source_type, &m.field_name))
            .collect();

        join_all(specs.into_iter().map(|spec| self.search_field(record, spec))).await
    }

    /// Search all records concurrently and return updated copies, plus a
    /// warning per field whose search hit a tool failure. Evidence is
    /// applied per record after all its field searches finish.
    pub async fn recover(
        &self,
        records: &[SowRecord],
        kb: &KnowledgeBase,
    ) -> (Vec<SowRecord>, Vec<RunWarning>) {
        let results = join_all(records.iter().map(|r| self.search_record(r, kb))).await;

        let mut warnings = Vec::new();
        let updated = records
            .iter()
            .zip(results)
            .map(|(record, results)| {
                for result in &results {
                    if let SearchOutcome::Exhausted(ExhaustReason::ToolFailed(e)) = &result.outcome {
                        warnings.push(
                            RunWarning::new(Phase::Search, format!("search tool failed: {e}"))
                                .about(format!("{}.{}", record.source_id, result.field)),
                        );
                    }
                }
                let mut updated = record.clone();
                apply_results(&mut updated, results, kb);
                updated
            })
            .collect();
        (updated, warnings)
    }
}

fn is_searchable(missing: &MissingField) -> bool {
    matches!(
        missing.search_state,
        SearchState::Pending | SearchState::Searching
    ) && missing.reason != REASON_INHERITED_PROPERTY
}

/// Move every searchable pending field to `searching`. Returns how many
/// fields are about to be searched.
pub fn begin_search(records: &mut [SowRecord]) -> usize {
    let mut started = 0;
    for missing in records
        .iter_mut()
        .flat_map(|r| r.missing_fields.iter_mut())
        .filter(|m| m.search_state == SearchState::Pending && is_searchable(m))
    {
        missing.search_state = SearchState::Searching;
        started += 1;
    }
    started
}

/// Fold search results into a record: recovered values are filled with
/// origin `search_recovered`, exhausted fields are marked, evidence is
/// appended in field order.
pub fn apply_results(record: &mut SowRecord, results: Vec<FieldSearchResult>, kb: &KnowledgeBase) {
    for result in results {
        let state = result.state();
        record.evidence.extend(result.evidence);
        match result.outcome {
            SearchOutcome::Recovered(value) => {
                record.set_field(&result.field, Some(value), FieldOrigin::SearchRecovered);
            }
            SearchOutcome::Exhausted(_) => {
                if let Some(missing) = record
                    .missing_fields
                    .iter_mut()
                    .find(|m| m.field_name == result.field)
                {
                    missing.search_state = state;
                }
            }
        }
    }
    completeness::refresh(record, kb);
}

/// State for one field's search.
struct FieldRun<'s, 'a> {
    searcher: &'s FieldSearcher<'a>,
    field: &'s str,
    invocations: usize,
    evidence: Vec<EvidenceEntry>,
}

impl FieldRun<'_, '_> {
    /// Walk the query plan. `Ok(None)` when every query ran without a
    /// verified value.
    async fn plan(&mut self, record: &SowRecord, spec: &FieldSpec) -> Result<Option<String>, Halt> {
        debug!(
            source_id = %record.source_id,
            field = %spec.name,
            ceiling = self.searcher.ceiling,
            "Searching for missing field"
        );

        if let Some(pattern) = cue_anchored(&spec.cues, spec.format) {
            if let Some(found) = self.invoke(ToolCall::regex(pattern)).await? {
                if let Some(value) = self.verify(&found.span).await? {
                    return Ok(Some(value));
                }
            }
        }

        let exclude = self.exclusions(record);
        let kind = EntityKind::for_format(spec.format);

        if kind.is_some() {
            for entity in self.context_entities(record, &spec.name) {
                let Some(scope) = self.invoke(ToolCall::exact(entity)).await? else {
                    continue;
                };
                if let Some(value) = self.within_scope(kind, &scope, &exclude).await? {
                    return Ok(Some(value));
                }
            }
        }

        if let Some(scope) = self.invoke(ToolCall::paragraph(keywords(spec))).await? {
            if let Some(value) = self.within_scope(kind, &scope, &exclude).await? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// Entity-search inside a scope and verify the hit. Free-text fields
    /// take the scope's span itself as the candidate.
    async fn within_scope(
        &mut self,
        kind: Option<EntityKind>,
        scope: &ToolMatch,
        exclude: &[String],
    ) -> Result<Option<String>, Halt> {
        let candidate = match kind {
            Some(kind) => {
                let call = ToolCall::entity(kind)
                    .within(scope.context.clone())
                    .excluding(exclude.iter().cloned());
                self.invoke(call).await?.map(|m| m.span)
            }
            None => Some(scope.span.clone()),
        };
        match candidate {
            Some(span) => self.verify(&span).await,
            None => Ok(None),
        }
    }

    /// Quote verification: the terminating predicate.
    async fn verify(&mut self, span: &str) -> Result<Option<String>, Halt> {
        let value = text::trim_value(span).to_string();
        if value.is_empty() {
            return Ok(None);
        }
        let verified = self.invoke(ToolCall::verify(value.clone())).await?;
        let narrative = self.searcher.narrative;
        Ok(verified
            .filter(|_| narrative.contains(value.as_str()))
            .map(|_| value))
    }

    /// One tool invocation, retried on transient errors. Every attempt
    /// counts against the ceiling and is logged.
    async fn invoke(&mut self, call: ToolCall) -> Result<Option<ToolMatch>, Halt> {
        let retry = self.searcher.retry;
        let max_attempts = retry.attempts();
        let mut attempt = 1;

        loop {
            if self.invocations >= self.searcher.ceiling {
                return Err(Halt::Budget);
            }
            self.invocations += 1;

            match self
                .searcher
                .toolbox
                .invoke(&call, self.searcher.narrative)
                .await
            {
                Ok(found) => {
                    let outcome = match (call.kind(), found.is_some()) {
                        (ToolKind::VerifyQuote, true) => EvidenceOutcome::Verified,
                        (ToolKind::VerifyQuote, false) => EvidenceOutcome::Rejected,
                        (_, true) => EvidenceOutcome::Match,
                        (_, false) => EvidenceOutcome::NoMatch,
                    };
                    self.log(&call, found.as_ref().map(|m| m.span.clone()), outcome);
                    return Ok(found);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        field = %self.field,
                        tool = call.kind().as_str(),
                        error = %e,
                        retry = attempt,
                        max_retries = max_attempts - 1,
                        "Search tool failed, retrying..."
                    );
                    self.log(&call, Some(e.to_string()), EvidenceOutcome::Error);
                    sleep(retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        field = %self.field,
                        tool = call.kind().as_str(),
                        error = %e,
                        "Search tool failed, field exhausted"
                    );
                    self.log(&call, Some(e.to_string()), EvidenceOutcome::Error);
                    return Err(Halt::Tool(e.to_string()));
                }
            }
        }
    }

    fn log(&mut self, call: &ToolCall, result: Option<String>, outcome: EvidenceOutcome) {
        self.evidence.push(EvidenceEntry::tool(
            self.field,
            call.kind(),
            call.query(),
            result,
            outcome,
        ));
    }

    /// Values the entity search should skip: holder names and values the
    /// record already carries.
    fn exclusions(&self, record: &SowRecord) -> Vec<String> {
        self.searcher
            .holder_names
            .iter()
            .cloned()
            .chain(
                record
                    .fields
                    .values()
                    .filter_map(|f| f.value.clone()),
            )
            .collect()
    }

    /// Person and company names already on the record, used to scope the
    /// search to where the record is discussed.
    fn context_entities(&self, record: &SowRecord, field: &str) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        for (name, value) in &record.fields {
            let Some(v) = value.value.as_deref() else {
                continue;
            };
            if name == field || text::tokens(v).is_empty() || !looks_like_entity(name) {
                continue;
            }
            if self
                .searcher
                .holder_names
                .iter()
                .any(|h| text::similarity(v, h) >= 1.0)
            {
                continue;
            }
            entities.push(v.to_string());
        }
        entities
    }
}

fn looks_like_entity(field: &str) -> bool {
    field.ends_with("_name")
        || field.ends_with("_provider")
        || field.ends_with("_identity")
        || field == "property_address"
}

/// Passage-search keywords: the field cues plus distinctive words of the
/// field name.
fn keywords(spec: &FieldSpec) -> Vec<String> {
    let mut words: Vec<String> = spec.cues.clone();
    for part in spec.name.split('_') {
        if part.len() > 2 && !FIELD_NAME_NOISE.contains(&part) && !words.iter().any(|w| w == part) {
            words.push(part.to_string());
        }
    }
    if spec.format == FieldFormat::Text && words.is_empty() {
        words.push(spec.readable_name());
    }
    words
}
