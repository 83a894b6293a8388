//! Source-of-Wealth Extraction Coordination Layer
//!
//! Turns a free-text client narrative into structured source-of-wealth
//! records for compliance review. Reasoning is delegated to pluggable
//! capabilities; this crate coordinates them.
//!
//! # Design Philosophy
//!
//! **"Coordinate, don't reason"**
//!
//! - Capabilities are unreliable: isolate each one behind retry + timeout
//! - Results overlap: merge duplicates, link related events, never guess
//! - Missing data is searched for in the narrative, within a hard budget
//! - Every recovered value is a verbatim quote
//! - Partial output beats no output
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sow_extraction::{KnowledgeBase, Orchestrator, PipelineConfig};
//!
//! let kb = Arc::new(KnowledgeBase::bundled()?);
//! let orchestrator = Orchestrator::builder(kb)
//!     .metadata(Arc::new(my_metadata_extractor))
//!     .extractors(my_extractors)           // one per source type
//!     .revalidator(Arc::new(my_revalidator))
//!     .config(PipelineConfig::default())
//!     .build();
//!
//! let envelope = orchestrator.run(&narrative).await?;
//! println!("{}", serde_json::to_string_pretty(&envelope)?);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Capability and search toolbox abstractions
//! - [`types`] - Records, evidence, envelope and configuration
//! - [`knowledge`] - Required-field knowledge base
//! - [`pipeline`] - Dispatch, dedup, search loop, validation, assembly
//! - [`tools`] - Deterministic narrative search toolbox
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod testing;
pub mod text;
pub mod tools;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    CapabilityError, CapabilityResult, PipelineError, Result, SchemaError, SchemaResult,
    ToolError, ToolResult,
};
pub use knowledge::{FieldConstraints, FieldFormat, FieldSpec, KnowledgeBase, SourceTypeSpec};
pub use pipeline::{Orchestrator, OrchestratorBuilder};
pub use tools::NarrativeToolbox;
pub use traits::{
    capability::{Extractor, FieldUpdates, FollowUpWriter, MetadataExtractor, Revalidator},
    toolbox::{EntityKind, SearchToolbox, ToolCall, ToolMatch},
};
pub use types::{
    config::{
        DedupConfig, FollowUpConfig, IdentityKey, PipelineConfig, RetryPolicy, SearchConfig,
        TimeoutConfig, ValidationConfig, MAX_TOOL_INVOCATIONS,
    },
    envelope::{FollowUpItem, PartialRun, Phase, ResultEnvelope, RunWarning, Summary},
    evidence::{EvidenceEntry, EvidenceOutcome, EvidenceTrail, ToolKind},
    record::{
        Attribution, CandidateRecord, FieldOrigin, FieldValue, MissingField, Provenance,
        SearchState, SourceId, SowRecord, ValidationStatus,
    },
    source::{AccountType, HolderContext, SourceType},
};

// Re-export tokio-util's token so callers don't need the dependency
pub use tokio_util::sync::CancellationToken;
