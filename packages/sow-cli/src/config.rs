use anyhow::{Context, Result};
use dotenvy::dotenv;
use sow_extraction::{KnowledgeBase, PipelineConfig, RetryPolicy};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub knowledge_base: Option<PathBuf>,
    pub run_timeout_secs: Option<u64>,
    pub call_timeout_secs: u64,
    pub max_attempts: u32,
    pub validation_threshold: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            knowledge_base: env::var("SOW_KNOWLEDGE_BASE").ok().map(PathBuf::from),
            run_timeout_secs: env::var("SOW_RUN_TIMEOUT_SECS")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("SOW_RUN_TIMEOUT_SECS must be a whole number of seconds")?,
            call_timeout_secs: env::var("SOW_CALL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("SOW_CALL_TIMEOUT_SECS must be a whole number of seconds")?,
            max_attempts: env::var("SOW_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("SOW_MAX_ATTEMPTS must be a valid number")?,
            validation_threshold: env::var("SOW_VALIDATION_THRESHOLD")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("SOW_VALIDATION_THRESHOLD must be a number between 0 and 1")?,
        })
    }

    /// Load the knowledge base from the configured path, or the bundled one.
    pub fn knowledge_base(&self) -> Result<KnowledgeBase> {
        match &self.knowledge_base {
            Some(path) => KnowledgeBase::from_path(path)
                .with_context(|| format!("Failed to load knowledge base from {}", path.display())),
            None => KnowledgeBase::bundled().context("Bundled knowledge base is invalid"),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let retry = RetryPolicy {
            max_attempts: self.max_attempts,
            ..Default::default()
        };
        let mut config = PipelineConfig::new()
            .with_retry(retry)
            .with_call_timeout(Duration::from_secs(self.call_timeout_secs))
            .with_validation_threshold(self.validation_threshold);
        if let Some(secs) = self.run_timeout_secs {
            config = config.with_run_timeout(Duration::from_secs(secs));
        }
        config
    }
}
