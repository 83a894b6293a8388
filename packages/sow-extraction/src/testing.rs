//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline without
//! making real reasoning calls.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{CapabilityError, CapabilityResult, ToolError, ToolResult};
use crate::knowledge::{FieldConstraints, KnowledgeBase};
use crate::pipeline::aggregate::build_record;
use crate::pipeline::Orchestrator;
use crate::traits::capability::{
    Extractor, FieldUpdates, FollowUpWriter, MetadataExtractor, Revalidator,
};
use crate::traits::toolbox::{SearchToolbox, ToolCall, ToolMatch};
use crate::types::config::{PipelineConfig, RetryPolicy};
use crate::types::envelope::FollowUpItem;
use crate::types::record::{CandidateRecord, SourceId, SowRecord};
use crate::types::source::{HolderContext, SourceType};

/// How a mock capability misbehaves.
#[derive(Debug, Clone, Copy, Default)]
enum Failure {
    #[default]
    None,
    /// Every call fails permanently
    Always,
    /// The first n calls are rate limited
    Transient(usize),
}

impl Failure {
    fn check(&self, call: usize, what: &str) -> CapabilityResult<()> {
        match self {
            Failure::None => Ok(()),
            Failure::Always => Err(CapabilityError::failed(format!("mock {what} failure"))),
            Failure::Transient(n) if call <= *n => Err(CapabilityError::RateLimited),
            Failure::Transient(_) => Ok(()),
        }
    }
}

/// A mock extractor for one source type.
///
/// Clones share candidates and call history, so a clone handed to the
/// orchestrator can still be inspected by the test.
#[derive(Clone)]
pub struct MockExtractor {
    source_type: SourceType,
    candidates: Arc<RwLock<Vec<CandidateRecord>>>,
    failure: Failure,
    delay: Option<Duration>,

    /// Holder name seen on each call
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockExtractor {
    /// An extractor that finds nothing.
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            candidates: Arc::new(RwLock::new(Vec::new())),
            failure: Failure::None,
            delay: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a candidate to return.
    pub fn with_candidate(self, candidate: CandidateRecord) -> Self {
        self.candidates.write().unwrap().push(candidate);
        self
    }

    /// Fail every call.
    pub fn failing(mut self) -> Self {
        self.failure = Failure::Always;
        self
    }

    /// Rate-limit the first `n` calls, then succeed.
    pub fn failing_transiently(mut self, n: usize) -> Self {
        self.failure = Failure::Transient(n);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Holder names passed in on each call.
    pub fn holders_seen(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn source_type(&self) -> SourceType {
        self.source_type
    }

    async fn extract(
        &self,
        _narrative: &str,
        holder: &HolderContext,
    ) -> CapabilityResult<Vec<CandidateRecord>> {
        let call = {
            let mut calls = self.calls.write().unwrap();
            calls.push(holder.holder_name.clone().unwrap_or_default());
            calls.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.failure.check(call, "extractor")?;
        Ok(self.candidates.read().unwrap().clone())
    }
}

/// A mock metadata extractor.
#[derive(Clone)]
pub struct MockMetadata {
    holder: HolderContext,
    failure: Failure,
    calls: Arc<RwLock<usize>>,
}

impl MockMetadata {
    pub fn new(holder: HolderContext) -> Self {
        Self {
            holder,
            failure: Failure::None,
            calls: Arc::new(RwLock::new(0)),
        }
    }

    /// Metadata extraction that always fails.
    pub fn failing() -> Self {
        Self {
            failure: Failure::Always,
            ..Self::new(HolderContext::unknown())
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.read().unwrap()
    }
}

#[async_trait]
impl MetadataExtractor for MockMetadata {
    async fn extract_metadata(&self, _narrative: &str) -> CapabilityResult<HolderContext> {
        let call = {
            let mut calls = self.calls.write().unwrap();
            *calls += 1;
            *calls
        };
        self.failure.check(call, "metadata")?;
        Ok(self.holder.clone())
    }
}

/// A mock re-extraction capability with answers keyed by source id.
#[derive(Clone, Default)]
pub struct MockRevalidator {
    updates: Arc<RwLock<HashMap<String, FieldUpdates>>>,
    failure: Failure,

    /// (source id, constrained field names) per call
    calls: Arc<RwLock<Vec<(String, Vec<String>)>>>,
}

impl MockRevalidator {
    /// A revalidator that confirms records without changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for one record, e.g. `"SOW_001"`.
    pub fn with_updates(self, source_id: impl Into<String>, updates: FieldUpdates) -> Self {
        self.updates
            .write()
            .unwrap()
            .insert(source_id.into(), updates);
        self
    }

    pub fn failing(mut self) -> Self {
        self.failure = Failure::Always;
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl Revalidator for MockRevalidator {
    async fn revalidate(
        &self,
        _narrative: &str,
        record: &SowRecord,
        constraints: &FieldConstraints,
    ) -> CapabilityResult<FieldUpdates> {
        let id = record.source_id.to_string();
        let call = {
            let mut calls = self.calls.write().unwrap();
            calls.push((
                id.clone(),
                constraints.fields.iter().map(|f| f.name.clone()).collect(),
            ));
            calls.len()
        };
        self.failure.check(call, "revalidator")?;
        Ok(self
            .updates
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

/// A mock follow-up writer.
#[derive(Clone, Default)]
pub struct MockFollowUp {
    questions: Arc<RwLock<Vec<String>>>,
    failure: Failure,
    received: Arc<RwLock<Vec<FollowUpItem>>>,
}

impl MockFollowUp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(self, questions: Vec<String>) -> Self {
        *self.questions.write().unwrap() = questions;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failure = Failure::Always;
        self
    }

    /// Items handed over on the last call.
    pub fn received(&self) -> Vec<FollowUpItem> {
        self.received.read().unwrap().clone()
    }
}

#[async_trait]
impl FollowUpWriter for MockFollowUp {
    async fn phrase_questions(
        &self,
        _holder: &HolderContext,
        items: &[FollowUpItem],
    ) -> CapabilityResult<Vec<String>> {
        *self.received.write().unwrap() = items.to_vec();
        self.failure.check(1, "follow-up")?;
        Ok(self.questions.read().unwrap().clone())
    }
}

/// A toolbox whose every invocation fails.
#[derive(Clone, Default)]
pub struct FailingToolbox {
    transient: bool,
}

impl FailingToolbox {
    /// Fails with a backend error (not retried).
    pub fn permanent() -> Self {
        Self { transient: false }
    }

    /// Fails with an unavailable error (retried).
    pub fn transient() -> Self {
        Self { transient: true }
    }
}

#[async_trait]
impl SearchToolbox for FailingToolbox {
    async fn invoke(&self, _call: &ToolCall, _narrative: &str) -> ToolResult<Option<ToolMatch>> {
        if self.transient {
            Err(ToolError::Unavailable("mock tool unavailable".into()))
        } else {
            Err(ToolError::Backend("mock tool failure".into()))
        }
    }
}

/// Wraps a toolbox and records every call.
#[derive(Clone)]
pub struct CountingToolbox<T> {
    inner: T,
    calls: Arc<RwLock<Vec<ToolCall>>>,
}

impl<T: SearchToolbox> CountingToolbox<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl<T: SearchToolbox> SearchToolbox for CountingToolbox<T> {
    async fn invoke(&self, call: &ToolCall, narrative: &str) -> ToolResult<Option<ToolMatch>> {
        self.calls.write().unwrap().push(call.clone());
        self.inner.invoke(call, narrative).await
    }
}

/// A record built the way aggregation builds one: id `SOW_001`, every
/// required field present (null when not given), score and missing list
/// computed.
pub fn record_with(source_type: SourceType, fields: &[(&str, &str)]) -> SowRecord {
    let kb = KnowledgeBase::bundled().unwrap();
    let candidate = fields
        .iter()
        .fold(CandidateRecord::new(source_type), |c, (name, value)| {
            c.with_field(*name, *value)
        });
    build_record(candidate, &kb, SourceId::new(1))
}

/// Builder for an orchestrator wired with mocks.
///
/// Starts with one empty extractor per source type, no metadata extractor,
/// and retries without backoff.
pub struct TestScenario {
    metadata: Option<MockMetadata>,
    extractors: BTreeMap<SourceType, MockExtractor>,
    revalidator: Option<MockRevalidator>,
    follow_up: Option<MockFollowUp>,
    toolbox: Option<Arc<dyn SearchToolbox>>,
    config: PipelineConfig,
}

impl TestScenario {
    pub fn new() -> Self {
        Self {
            metadata: None,
            extractors: SourceType::ALL
                .into_iter()
                .map(|t| (t, MockExtractor::new(t)))
                .collect(),
            revalidator: None,
            follow_up: None,
            toolbox: None,
            config: PipelineConfig::new().with_retry(RetryPolicy::immediate(3)),
        }
    }

    pub fn with_metadata(mut self, metadata: MockMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Replace the extractor for its source type.
    pub fn with_extractor(mut self, extractor: MockExtractor) -> Self {
        self.extractors.insert(extractor.source_type, extractor);
        self
    }

    /// Add a candidate to the extractor of its source type.
    pub fn with_candidate(self, candidate: CandidateRecord) -> Self {
        if let Some(extractor) = self.extractors.get(&candidate.source_type) {
            extractor.candidates.write().unwrap().push(candidate);
        }
        self
    }

    /// Make every extractor fail.
    pub fn all_failing(mut self) -> Self {
        self.extractors = SourceType::ALL
            .into_iter()
            .map(|t| (t, MockExtractor::new(t).failing()))
            .collect();
        self
    }

    pub fn with_revalidator(mut self, revalidator: MockRevalidator) -> Self {
        self.revalidator = Some(revalidator);
        self
    }

    pub fn with_follow_up(mut self, writer: MockFollowUp) -> Self {
        self.follow_up = Some(writer);
        self
    }

    pub fn with_toolbox(mut self, toolbox: Arc<dyn SearchToolbox>) -> Self {
        self.toolbox = Some(toolbox);
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// The extractor registered for a type, sharing call history.
    pub fn extractor(&self, source_type: SourceType) -> Option<MockExtractor> {
        self.extractors.get(&source_type).cloned()
    }

    pub fn build(self) -> Orchestrator {
        let kb = Arc::new(KnowledgeBase::bundled().unwrap());
        let mut builder = Orchestrator::builder(kb)
            .extractors(
                self.extractors
                    .into_values()
                    .map(|e| Arc::new(e) as Arc<dyn Extractor>),
            )
            .config(self.config);
        if let Some(metadata) = self.metadata {
            builder = builder.metadata(Arc::new(metadata));
        }
        if let Some(revalidator) = self.revalidator {
            builder = builder.revalidator(Arc::new(revalidator));
        }
        if let Some(writer) = self.follow_up {
            builder = builder.follow_up(Arc::new(writer));
        }
        if let Some(toolbox) = self.toolbox {
            builder = builder.toolbox(toolbox);
        }
        builder.build()
    }
}

impl Default for TestScenario {
    fn default() -> Self {
        Self::new()
    }
}
