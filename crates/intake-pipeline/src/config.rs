//! Pipeline configuration.
//!
//! Every section and field is defaulted, so an empty TOML document is a valid
//! configuration and a file only needs to name what it changes:
//!
//! ```toml
//! [ocr]
//! concurrency = 4
//!
//! [ocr.rate_limit]
//! max_jobs = 20
//! window_ms = 60000
//!
//! [scoring]
//! max_attempts = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use intake_contracts::error::{IntakeError, IntakeResult};
use intake_core::RetryPolicy;

/// Concurrency and job-level retry for one stage's worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

fn pool(concurrency: usize, max_attempts: u32, backoff_base_ms: u64) -> PoolSettings {
    PoolSettings {
        concurrency,
        retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_base_ms)),
    }
}

// ── Stage sections ────────────────────────────────────────────────────────────

/// Sliding-window admission limit on a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_jobs: usize,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_jobs: 10,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub rate_limit: RateLimitConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl OcrConfig {
    pub fn pool(&self) -> PoolSettings {
        pool(self.concurrency, self.max_attempts, self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Characters of OCR text sent to the classifier.
    pub prefix_chars: usize,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            prefix_chars: 3_000,
        }
    }
}

impl ClassificationConfig {
    pub fn pool(&self) -> PoolSettings {
        pool(self.concurrency, self.max_attempts, self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Characters of each document's OCR text sent to the extractor.
    pub per_document_chars: usize,
    /// Stamped on every stored extraction.
    pub extraction_version: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            per_document_chars: 4_000,
            extraction_version: "1.0".to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn pool(&self) -> PoolSettings {
        pool(self.concurrency, self.max_attempts, self.backoff_base_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Stamped on every recommendation.
    pub model_version: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            max_attempts: 2,
            backoff_base_ms: 5_000,
            model_version: "multi-agent-v1".to_string(),
        }
    }
}

impl ScoringConfig {
    pub fn pool(&self) -> PoolSettings {
        pool(self.concurrency, self.max_attempts, self.backoff_base_ms)
    }
}

/// Bounds on every individual external capability call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub timeout_ms: u64,
    /// In-call attempts for AI capabilities before a stage degrades.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 2,
            backoff_base_ms: 500,
        }
    }
}

impl CapabilityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.backoff_base_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    /// Lifetime of presigned download URLs.
    pub presign_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "referralflow-documents".to_string(),
            presign_ttl_secs: 3_600,
        }
    }
}

impl StorageConfig {
    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ocr: OcrConfig,
    pub classification: ClassificationConfig,
    pub extraction: ExtractionConfig,
    pub scoring: ScoringConfig,
    pub capabilities: CapabilityConfig,
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(s: &str) -> IntakeResult<Self> {
        let config: PipelineConfig = toml::from_str(s).map_err(|e| IntakeError::ConfigError {
            reason: format!("failed to parse pipeline config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> IntakeResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| IntakeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values that would stall the pipeline.
    pub fn validate(&self) -> IntakeResult<()> {
        let pools = [
            ("ocr", self.ocr.pool()),
            ("classification", self.classification.pool()),
            ("extraction", self.extraction.pool()),
            ("scoring", self.scoring.pool()),
        ];
        for (name, pool) in pools {
            if pool.concurrency == 0 {
                return Err(invalid(format!("{name}.concurrency must be at least 1")));
            }
            if pool.retry.max_attempts == 0 {
                return Err(invalid(format!("{name}.max_attempts must be at least 1")));
            }
        }
        if self.ocr.rate_limit.max_jobs == 0 || self.ocr.rate_limit.window_ms == 0 {
            return Err(invalid("ocr.rate_limit needs a positive max_jobs and window_ms".to_string()));
        }
        if self.capabilities.timeout_ms == 0 {
            return Err(invalid("capabilities.timeout_ms must be positive".to_string()));
        }
        if self.classification.prefix_chars == 0 || self.extraction.per_document_chars == 0 {
            return Err(invalid("text truncation limits must be positive".to_string()));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(invalid("storage.bucket must not be empty".to_string()));
        }
        Ok(())
    }
}

fn invalid(reason: String) -> IntakeError {
    IntakeError::ConfigError { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());

        assert_eq!(config.ocr.pool().concurrency, 3);
        assert_eq!(config.classification.pool().concurrency, 5);
        assert_eq!(config.extraction.pool().concurrency, 2);
        assert_eq!(config.scoring.pool().concurrency, 2);
        assert_eq!(config.ocr.rate_limit.max_jobs, 10);
        assert_eq!(config.ocr.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.capabilities.timeout(), Duration::from_secs(30));
        assert_eq!(config.classification.prefix_chars, 3_000);
        assert_eq!(config.storage.presign_ttl(), Duration::from_secs(3_600));
    }

    #[test]
    fn retry_defaults_per_stage() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.ocr.pool().retry,
            RetryPolicy::new(3, Duration::from_millis(2_000))
        );
        assert_eq!(
            config.scoring.pool().retry,
            RetryPolicy::new(2, Duration::from_millis(5_000))
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [ocr]
            concurrency = 8

            [ocr.rate_limit]
            max_jobs = 100

            [storage]
            bucket = "local"
            "#,
        )
        .unwrap();

        assert_eq!(config.ocr.concurrency, 8);
        assert_eq!(config.ocr.max_attempts, 3);
        assert_eq!(config.ocr.rate_limit.max_jobs, 100);
        assert_eq!(config.ocr.rate_limit.window_ms, 60_000);
        assert_eq!(config.storage.bucket, "local");
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = PipelineConfig::from_toml_str("[scoring]\nconcurrency = 0\n").unwrap_err();
        assert!(
            matches!(&err, IntakeError::ConfigError { reason } if reason.contains("scoring.concurrency")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("[ocr\nconcurrency = ").unwrap_err();
        assert!(matches!(err, IntakeError::ConfigError { .. }));
    }
}
