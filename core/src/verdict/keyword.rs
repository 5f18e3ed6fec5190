//! Deterministic keyword suitability strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{Method, SuitabilityVerdict};
use crate::classify::scoring::{score, ScoringInput};
use crate::config::ScoringConfig;
use crate::issue::Issue;
use crate::rules::{RuleKey, RuleSet};

/// The two sides of the suitability decision. `Unsuitable` is listed
/// first so that ties are resolved conservatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suitability {
    Unsuitable,
    Suitable,
}

impl RuleKey for Suitability {
    const ALL: &'static [Self] = &[Self::Unsuitable, Self::Suitable];
    const BUNDLED_RULES: &'static str = include_str!("../../resources/suitability_rules.json");

    fn fallback() -> Self {
        Self::Unsuitable
    }
}

impl fmt::Display for Suitability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unsuitable => "unsuitable",
            Self::Suitable => "suitable",
        })
    }
}

#[derive(Debug, Clone)]
pub struct KeywordStrategy {
    rules: Arc<RuleSet<Suitability>>,
    scoring: ScoringConfig,
}

impl KeywordStrategy {
    pub fn new(rules: Arc<RuleSet<Suitability>>, scoring: ScoringConfig) -> Self {
        Self { rules, scoring }
    }

    pub fn evaluate(&self, issue: &Issue) -> SuitabilityVerdict {
        let labels = issue.label_list();
        let text = if labels.is_empty() {
            issue.text()
        } else {
            format!("{} {}", issue.text(), labels.join(" "))
        };
        let outcome = score(&ScoringInput::new(&text, &labels), &self.rules, &self.scoring);
        let suitable = outcome.winner == Suitability::Suitable;

        let mut reason = if outcome.matched_terms.is_empty() {
            "Keyword analysis: no clear implementation indicators".to_owned()
        } else {
            format!(
                "Keyword analysis: {} indicators ({})",
                outcome.winner,
                outcome.matched_terms.join(", ")
            )
        };
        if !outcome.excluded_terms.is_empty() {
            reason.push_str(&format!("; excluded terms: {}", outcome.excluded_terms.join(", ")));
        }

        SuitabilityVerdict {
            suitable,
            method: Method::Keyword,
            confidence: outcome.confidence,
            certainty: None,
            reason,
            source_labels: issue.labels.clone(),
        }
    }
}
