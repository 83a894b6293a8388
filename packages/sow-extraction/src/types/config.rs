//! Configuration types for the pipeline.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::source::SourceType;

/// Hard ceiling on tool invocations per field. Configured values above this
/// are clamped.
pub const MAX_TOOL_INVOCATIONS: usize = 5;

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retry policy shared by every capability, validation and tool call.
    pub retry: RetryPolicy,

    /// Timeouts for single calls and the whole run.
    pub timeouts: TimeoutConfig,

    /// Field-search loop settings.
    pub search: SearchConfig,

    /// Validation selector settings.
    pub validation: ValidationConfig,

    /// Merge and link policy.
    pub dedup: DedupConfig,

    /// Fallback follow-up question limits.
    pub follow_up: FollowUpConfig,
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the whole-run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.run_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the per-field invocation ceiling (clamped to 5).
    pub fn with_max_invocations(mut self, max: usize) -> Self {
        self.search.max_invocations = max;
        self
    }

    /// Set the completeness threshold below which records are re-validated.
    pub fn with_validation_threshold(mut self, threshold: f64) -> Self {
        self.validation.completeness_threshold = threshold;
        self
    }

    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first. Default: 3.
    pub max_attempts: u32,

    /// Delay before the first retry. Default: 4000ms.
    pub base_delay_ms: u64,

    /// Upper bound on any single delay. Default: 30000ms.
    pub max_delay_ms: u64,

    /// Backoff multiplier. Default: 2.0.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 4_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// Attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let ms = (self.base_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// Per-call and whole-run timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per capability call. Default: 60s.
    pub call_timeout_ms: u64,

    /// Whole run. None means unbounded.
    pub run_timeout_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 60_000,
            run_timeout_ms: None,
        }
    }
}

impl TimeoutConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

/// Field-search loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Tool invocations per field. Values above 5 are clamped. Default: 5.
    pub max_invocations: usize,

    /// Characters of context returned around a match. Default: 80.
    pub context_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_invocations: MAX_TOOL_INVOCATIONS,
            context_chars: 80,
        }
    }
}

impl SearchConfig {
    /// Effective ceiling: between 1 and [`MAX_TOOL_INVOCATIONS`].
    pub fn ceiling(&self) -> usize {
        self.max_invocations.clamp(1, MAX_TOOL_INVOCATIONS)
    }
}

/// Validation selector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Records scoring below this are re-validated. Default: 0.5.
    pub completeness_threshold: f64,

    /// Also select records holding a value not found in the narrative.
    ///
    /// Default: true.
    pub check_grounding: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            completeness_threshold: 0.5,
            check_grounding: true,
        }
    }
}

/// The fields that identify a real-world event of one source type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityKey {
    /// Compared for similarity; null never merges.
    pub primary: String,

    /// Must agree when populated on both sides.
    #[serde(default)]
    pub qualifiers: Vec<String>,
}

impl IdentityKey {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            qualifiers: vec![],
        }
    }

    pub fn qualified_by(mut self, field: impl Into<String>) -> Self {
        self.qualifiers.push(field.into());
        self
    }
}

/// Merge and link policy for the dedup engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Identity-key similarity needed to merge. Default: 0.8.
    pub merge_threshold: f64,

    /// Share of an anchor's tokens that must appear in a text for the
    /// anchor to count as mentioned. Default: 0.75.
    pub mention_threshold: f64,

    /// Identity keys per source type.
    pub identity_keys: IndexMap<SourceType, IdentityKey>,

    /// Words that connect two events in one sentence ("proceeds", "funded").
    pub funding_cues: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        let identity_keys = IndexMap::from([
            (
                SourceType::EmploymentIncome,
                IdentityKey::new("employer_name").qualified_by("employment_start_date"),
            ),
            (SourceType::BusinessIncome, IdentityKey::new("business_name")),
            (SourceType::BusinessDividends, IdentityKey::new("company_name")),
            (SourceType::SaleOfBusiness, IdentityKey::new("business_name")),
            (SourceType::SaleOfAsset, IdentityKey::new("asset_description")),
            (SourceType::SaleOfProperty, IdentityKey::new("property_address")),
            (SourceType::Inheritance, IdentityKey::new("deceased_name")),
            (
                SourceType::Gift,
                IdentityKey::new("donor_name").qualified_by("gift_date"),
            ),
            (
                SourceType::DivorceSettlement,
                IdentityKey::new("former_spouse_name"),
            ),
            (
                SourceType::LotteryWinnings,
                IdentityKey::new("lottery_name").qualified_by("win_date"),
            ),
            (
                SourceType::InsurancePayout,
                IdentityKey::new("insurance_provider").qualified_by("claim_event_description"),
            ),
        ]);

        Self {
            merge_threshold: 0.8,
            mention_threshold: 0.75,
            identity_keys,
            funding_cues: [
                "proceeds",
                "funded",
                "used",
                "paid for",
                "financed",
                "invested",
                "went towards",
                "put towards",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl DedupConfig {
    pub fn with_merge_threshold(mut self, threshold: f64) -> Self {
        self.merge_threshold = threshold;
        self
    }

    pub fn with_identity_key(mut self, source_type: SourceType, key: IdentityKey) -> Self {
        self.identity_keys.insert(source_type, key);
        self
    }

    pub fn identity_key(&self, source_type: SourceType) -> Option<&IdentityKey> {
        self.identity_keys.get(&source_type)
    }
}

/// Fallback follow-up question limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpConfig {
    /// Default: 2.
    pub per_record: usize,

    /// Default: 10.
    pub total: usize,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            per_record: 2,
            total: 10,
        }
    }
}
