//! Suitability verdicts and the strategies that produce them.

pub mod hybrid;
pub mod keyword;
pub mod llm;
pub mod prompt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ai::JudgeError;
use crate::issue::Issue;
use crate::references::ReferenceExample;

pub use hybrid::combine;
pub use keyword::KeywordStrategy;
pub use llm::LlmStrategy;

/// How a verdict was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Keyword,
    Llm,
    Hybrid,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Llm => "llm",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether this method calls the LLM.
    pub fn uses_llm(self) -> bool {
        !matches!(self, Self::Keyword)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "llm" => Ok(Self::Llm),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown method '{other}'")),
        }
    }
}

/// Qualitative certainty an LLM may attach to its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Low,
    Medium,
    High,
}

impl Certainty {
    /// Numeric confidence standing in for this bucket.
    pub fn bucket(self) -> f64 {
        match self {
            Self::Low => 0.3,
            Self::Medium => 0.6,
            Self::High => 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuitabilityVerdict {
    pub suitable: bool,
    pub method: Method,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<Certainty>,
    pub reason: String,
    /// Issue labels at evaluation time.
    #[serde(default)]
    pub source_labels: BTreeSet<String>,
}

impl SuitabilityVerdict {
    /// SHA-256 hex of the verdict's JSON form. Field order is fixed by the
    /// struct and labels are sorted, so equal verdicts hash equally.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("Unparsable LLM reply: {0}")]
    Parse(String),
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<VerdictError> },
}

impl VerdictError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Parse(_) => true,
            Self::Judge(e) => e.is_retryable(),
            Self::Exhausted { .. } => false,
        }
    }
}

/// What a strategy may consult besides the issue itself.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub references: Vec<ReferenceExample>,
}

/// The closed set of suitability strategies.
pub enum VerdictProvider {
    Keyword(KeywordStrategy),
    Llm(LlmStrategy),
    Hybrid {
        keyword: KeywordStrategy,
        llm: LlmStrategy,
    },
}

impl VerdictProvider {
    pub fn method(&self) -> Method {
        match self {
            Self::Keyword(_) => Method::Keyword,
            Self::Llm(_) => Method::Llm,
            Self::Hybrid { .. } => Method::Hybrid,
        }
    }

    /// Judge requests made so far; always 0 for the keyword strategy.
    pub fn llm_calls(&self) -> u64 {
        match self {
            Self::Keyword(_) => 0,
            Self::Llm(llm) | Self::Hybrid { llm, .. } => llm.calls(),
        }
    }

    /// Judge one issue. The keyword path never fails; LLM failures are
    /// returned once retries are spent and are never replaced by a
    /// keyword verdict.
    pub async fn evaluate(
        &self,
        issue: &Issue,
        ctx: &EvaluationContext,
    ) -> Result<SuitabilityVerdict, VerdictError> {
        match self {
            Self::Keyword(strategy) => Ok(strategy.evaluate(issue)),
            Self::Llm(strategy) => strategy.evaluate(issue, ctx).await,
            Self::Hybrid { keyword, llm } => {
                let keyword_verdict = keyword.evaluate(issue);
                let llm_verdict = llm.evaluate(issue, ctx).await?;
                Ok(combine(&keyword_verdict, &llm_verdict))
            }
        }
    }
}
