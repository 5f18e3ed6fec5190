//! Analysis configuration.
//!
//! Every threshold the scorers and the LLM strategy use is a named field
//! here. All fields have defaults, so a config file only needs to list
//! what it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::classify::Category;
use crate::rules::{RuleError, RuleSet};
use crate::verdict::keyword::Suitability;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Input path does not exist: {0}")]
    MissingInput(PathBuf),
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
    #[error("Could not read config {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
    #[error("Invalid config value: {0}")]
    Invalid(String),
    #[error("Rule set error: {0}")]
    Rules(#[from] RuleError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Subtracted once per distinct exclusion term present.
    pub exclusion_penalty: f64,
    /// Added when any template pattern of a key matches.
    pub template_bonus: f64,
    /// Added when any issue label contains one of a key's label hints.
    pub label_bonus: f64,
    /// Minimum normalized score a key needs to win.
    pub min_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            exclusion_penalty: 1.0,
            template_bonus: 10.0,
            label_bonus: 2.0,
            min_confidence: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling each time.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_body_chars: usize,
    pub max_reference_examples: usize,
    pub max_reference_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "glm-4.5-air".to_owned(),
            base_url: "https://open.bigmodel.cn/api/paas/v4".to_owned(),
            request_timeout_secs: 60,
            max_body_chars: 2_000,
            max_reference_examples: 3,
            max_reference_chars: 1_500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub scoring: ScoringConfig,
    pub retry: RetryPolicy,
    pub concurrency: usize,
    pub llm: LlmConfig,
    /// Replaces the bundled category rules.
    pub category_rules: Option<PathBuf>,
    /// Replaces the bundled suitability rules.
    pub suitability_rules: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            retry: RetryPolicy::default(),
            concurrency: 4,
            llm: LlmConfig::default(),
            category_rules: None,
            suitability_rules: None,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        if !(scoring.min_confidence > 0.0 && scoring.min_confidence <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scoring.min_confidence must be in (0, 1], got {}",
                scoring.min_confidence
            )));
        }
        for (name, value) in [
            ("scoring.exclusion_penalty", scoring.exclusion_penalty),
            ("scoring.template_bonus", scoring.template_bonus),
            ("scoring.label_bonus", scoring.label_bonus),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".to_owned()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_owned()));
        }
        Ok(())
    }

    pub fn category_rule_set(&self) -> Result<RuleSet<Category>, ConfigError> {
        Ok(match &self.category_rules {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::bundled()?,
        })
    }

    pub fn suitability_rule_set(&self) -> Result<RuleSet<Suitability>, ConfigError> {
        Ok(match &self.suitability_rules {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::bundled()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{"scoring": {"min_confidence": 0.1}, "concurrency": 8}"#).unwrap();
        assert!((config.scoring.min_confidence - 0.1).abs() < f64::EPSILON);
        assert!((config.scoring.template_bonus - 10.0).abs() < f64::EPSILON);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(350));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(350));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = AnalysisConfig::default();
        config.scoring.min_confidence = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = AnalysisConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reports_unreadable_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            AnalysisConfig::load(&missing),
            Err(ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"retry": {"max_attempts": 5}}"#).unwrap();
        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_custom_rule_file_replaces_bundled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(&path, r#"{"rules": {"bug": {"keywords": {"high": ["kaboom"]}}}}"#).unwrap();
        let config = AnalysisConfig {
            category_rules: Some(path),
            ..AnalysisConfig::default()
        };
        let set = config.category_rule_set().unwrap();
        assert!(set.rules_for(Category::Enhancement).is_none());
        assert_eq!(set.rules_for(Category::Bug).unwrap().keywords.len(), 1);
    }
}
