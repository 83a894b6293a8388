//! The coordination pipeline.
//!
//! The pipeline orchestrates:
//! - Parallel extraction dispatch with per-capability isolation
//! - Aggregation into records with stable identifiers
//! - Deduplication, overlap links and joint-account attribution
//! - The bounded field-search loop
//! - Validation selection and re-extraction
//! - Completeness scoring, follow-up hand-off and envelope assembly

pub mod aggregate;
pub mod assemble;
pub mod completeness;
pub mod dedup;
pub mod dispatch;
pub mod followup;
pub mod grounding;
pub mod orchestrator;
pub mod retry;
pub mod search;
pub mod validation;

pub use aggregate::{aggregate, build_record, canonical_order, describe, IdAllocator};
pub use assemble::{assemble, compliance_flags, summarize, AssemblyInput};
pub use dedup::{
    attribute_joint, deduplicate, link_records, merge_into, should_merge, AliasMap, DedupOutcome,
    LinkReason, OverlapLinks,
};
pub use dispatch::{dispatch_extractors, DispatchOutcome};
pub use followup::{fallback_questions, follow_up_items, phrase_questions};
pub use grounding::{check_value, ungrounded_fields, Grounding};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use search::{
    apply_results, begin_search, ExhaustReason, FieldSearchResult, FieldSearcher, SearchOutcome,
};
pub use validation::{
    apply_updates, selection_reasons, validate_records, SelectionReason, ValidationOutcome,
};
