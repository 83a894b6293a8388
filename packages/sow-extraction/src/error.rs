//! Typed errors for the source-of-wealth pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so that callers can
//! match on what went wrong: bad input, a dead run, a broken knowledge base,
//! or a single misbehaving collaborator.

use thiserror::Error;

use crate::types::envelope::PartialRun;
use crate::types::source::SourceType;

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The narrative was empty or whitespace only
    #[error("invalid input: {reason}")]
    Input { reason: String },

    /// Metadata and every extraction capability failed
    #[error("pipeline failed: {reason}")]
    Fatal {
        reason: String,
        partial: Box<PartialRun>,
    },

    /// The knowledge base violates a schema invariant
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl PipelineError {
    /// Shorthand for an input error.
    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }

    /// Partial state carried by a fatal error, if any.
    pub fn partial(&self) -> Option<&PartialRun> {
        match self {
            Self::Fatal { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Errors raised by an external capability (extractor, metadata,
/// revalidator, follow-up writer).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The capability failed outright
    #[error("capability failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The call did not finish within its per-call timeout
    #[error("capability timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The backend asked us to slow down
    #[error("rate limit exceeded")]
    RateLimited,

    /// The capability answered with something we could not use
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CapabilityError {
    /// Build a `Failed` error from a plain message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }

    /// Whether the retry policy should try this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RateLimited)
    }
}

/// Knowledge base invariant violations. Fatal at construction, never per run.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A declared source type has no entry
    #[error("knowledge base is missing source type: {0}")]
    MissingSourceType(SourceType),

    /// A source type declares no required fields
    #[error("source type {0} declares no required fields")]
    NoRequiredFields(SourceType),

    /// The document names a type outside the fixed set
    #[error("unknown source type: {0}")]
    UnknownSourceType(String),

    /// The document has no `source_of_wealth_types` root
    #[error("knowledge base has no source_of_wealth_types root")]
    MissingRoot,

    /// Knowledge base JSON could not be parsed
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Knowledge base file could not be read
    #[error("failed to read knowledge base: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a search tool implementation. "No match" is not an error.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A regex query did not compile
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The tool backend is temporarily unavailable
    #[error("tool unavailable: {0}")]
    Unavailable(String),

    /// The tool backend failed
    #[error("tool backend error: {0}")]
    Backend(String),
}

impl ToolError {
    /// Whether the retry policy should try this invocation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type alias for pipeline runs.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Result type alias for knowledge base operations.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Result type alias for search tool invocations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CapabilityError::RateLimited.is_transient());
        assert!(CapabilityError::Timeout { after_ms: 10 }.is_transient());
        assert!(!CapabilityError::failed("boom").is_transient());
        assert!(!CapabilityError::InvalidResponse("bad".into()).is_transient());

        assert!(ToolError::Unavailable("busy".into()).is_transient());
        assert!(!ToolError::Backend("down".into()).is_transient());
    }

    #[test]
    fn test_failed_message() {
        let err = CapabilityError::failed("model refused");
        assert_eq!(err.to_string(), "capability failed: model refused");
    }
}
