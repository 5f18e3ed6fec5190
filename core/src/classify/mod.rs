//! Issue category classification (bug / enhancement / other).

pub mod scoring;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ScoringConfig;
use crate::issue::Issue;
use crate::rules::{RuleKey, RuleSet};
use scoring::{score, ScoringInput};

/// Issue category. Declaration order is the tie-break priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Bug,
    Enhancement,
    Other,
}

impl RuleKey for Category {
    const ALL: &'static [Self] = &[Self::Bug, Self::Enhancement, Self::Other];
    const BUNDLED_RULES: &'static str = include_str!("../../resources/category_rules.json");

    fn fallback() -> Self {
        Self::Other
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bug => "bug",
            Self::Enhancement => "enhancement",
            Self::Other => "other",
        })
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bug" | "bugs" => Ok(Self::Bug),
            "enhancement" | "enhancements" | "feature" => Ok(Self::Enhancement),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: f64,
    /// Terms that contributed to the winning category, in rule order.
    pub matched_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_terms: Vec<String>,
    /// Normalized score of every category that has rules.
    #[serde(default)]
    pub scores: BTreeMap<Category, f64>,
}

/// Classify free text. Pure; empty text yields `other` with confidence 0.
pub fn classify(text: &str, rules: &RuleSet<Category>, config: &ScoringConfig) -> ClassificationResult {
    classify_input(&ScoringInput::new(text, &[]), rules, config)
}

/// Classify an issue from its title, body and labels. Labels are scored
/// as text and also checked against each category's label hints.
pub fn classify_issue(issue: &Issue, rules: &RuleSet<Category>, config: &ScoringConfig) -> ClassificationResult {
    let labels = issue.label_list();
    let text = if labels.is_empty() {
        issue.text()
    } else {
        format!("{} {}", issue.text(), labels.join(" "))
    };
    classify_input(&ScoringInput::new(&text, &labels), rules, config)
}

fn classify_input(input: &ScoringInput, rules: &RuleSet<Category>, config: &ScoringConfig) -> ClassificationResult {
    let outcome = score(input, rules, config);
    ClassificationResult {
        category: outcome.winner,
        confidence: outcome.confidence,
        matched_terms: outcome.matched_terms,
        excluded_terms: outcome.excluded_terms,
        scores: outcome.scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundled() -> RuleSet<Category> {
        RuleSet::bundled().unwrap()
    }

    fn small_rules() -> RuleSet<Category> {
        RuleSet::from_json(
            r#"{
                "rules": {
                    "bug": {"keywords": {"high": ["crash", "error"], "medium": ["fix"]}, "templates": ["bug\\s+report"]},
                    "enhancement": {"keywords": {"high": ["feature", "support"], "medium": ["option"]}},
                    "other": {"keywords": {"low": ["question", "help"]}}
                },
                "exclusions": ["question", "help", "discussion"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_text_is_other_with_zero_confidence() {
        let result = classify("", &bundled(), &ScoringConfig::default());
        assert_eq!(result.category, Category::Other);
        assert!(result.confidence.abs() < f64::EPSILON);
        assert!(result.matched_terms.is_empty());
    }

    #[test]
    fn test_malformed_text_does_not_panic() {
        let result = classify("\u{0}\u{202e}### ***", &bundled(), &ScoringConfig::default());
        assert_eq!(result.category, Category::Other);
    }

    #[test]
    fn test_crash_report_is_bug() {
        let result = classify(
            "App crash on startup: unexpected exception when opening a file",
            &bundled(),
            &ScoringConfig::default(),
        );
        assert_eq!(result.category, Category::Bug);
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
        assert!(result.matched_terms.contains(&"crash".to_owned()));
    }

    #[test]
    fn test_feature_request_is_enhancement() {
        let result = classify(
            "Feature request: add support for a custom theme option",
            &bundled(),
            &ScoringConfig::default(),
        );
        assert_eq!(result.category, Category::Enhancement);
    }

    #[test]
    fn test_exclusion_only_text_never_selects_scored_category() {
        let rules = bundled();
        let config = ScoringConfig::default();
        let exclusions: Vec<String> = rules.exclusions().iter().map(|t| t.as_str().to_owned()).collect();

        for term in &exclusions {
            let result = classify(term, &rules, &config);
            assert_eq!(result.category, Category::Other, "term '{term}' selected {}", result.category);
        }
        let all = exclusions.join(" ");
        assert_eq!(classify(&all, &rules, &config).category, Category::Other);
    }

    #[test]
    fn test_confidence_is_monotonic_in_matching_keywords() {
        let rules = small_rules();
        let config = ScoringConfig::default();
        let texts = [
            "the app fails",
            "the app fails with a crash",
            "the app fails with a crash and an error",
            "the app fails with a crash and an error, please fix",
        ];
        let mut previous = 0.0;
        for text in texts {
            let result = classify(text, &rules, &config);
            let bug_score = result.scores[&Category::Bug];
            assert!(bug_score >= previous, "'{text}' dropped to {bug_score}");
            previous = bug_score;
        }
        assert_eq!(classify(texts[3], &rules, &config).category, Category::Bug);
    }

    #[test]
    fn test_tie_prefers_bug_over_enhancement() {
        let rules = RuleSet::<Category>::from_json(
            r#"{"rules": {
                "bug": {"keywords": {"high": ["glitch"]}},
                "enhancement": {"keywords": {"high": ["widget"]}}
            }}"#,
        )
        .unwrap();
        let result = classify("glitch widget", &rules, &ScoringConfig::default());
        assert_eq!(result.category, Category::Bug);
        assert!((result.scores[&Category::Bug] - result.scores[&Category::Enhancement]).abs() < 1e-9);
    }

    #[test]
    fn test_template_match_adds_bonus() {
        let rules = small_rules();
        let config = ScoringConfig::default();
        let plain = classify("crash", &rules, &config);
        let templated = classify("Bug report: crash", &rules, &config);
        assert!(templated.confidence > plain.confidence);
        assert!(templated.matched_terms.iter().any(|t| t.starts_with("template:")));
    }

    #[test]
    fn test_exclusions_penalize_scored_categories() {
        let rules = small_rules();
        let config = ScoringConfig::default();
        let clean = classify("crash error", &rules, &config);
        let noisy = classify("crash error question discussion", &rules, &config);
        assert!(noisy.scores[&Category::Bug] < clean.scores[&Category::Bug]);
        assert_eq!(noisy.excluded_terms, vec!["question".to_owned(), "discussion".to_owned()]);
    }

    #[test]
    fn test_below_threshold_falls_back_to_other() {
        let rules = small_rules();
        let config = ScoringConfig {
            min_confidence: 0.9,
            ..ScoringConfig::default()
        };
        let result = classify("crash", &rules, &config);
        assert_eq!(result.category, Category::Other);
        assert!(result.confidence < 0.9);
    }

    #[test]
    fn test_label_hint_adds_bonus() {
        let rules = bundled();
        let config = ScoringConfig::default();
        let issue = Issue::new(1, "Editor hangs", "").with_labels(["type: bug"]);
        let with_label = classify_issue(&issue, &rules, &config);
        let without = classify_issue(&Issue::new(1, "Editor hangs", ""), &rules, &config);
        assert!(with_label.scores[&Category::Bug] > without.scores[&Category::Bug]);
        assert!(with_label.matched_terms.iter().any(|t| t.starts_with("label:")));
    }

    #[test]
    fn test_chinese_keywords_are_scored() {
        let result = classify("保存文件时程序崩溃，出现异常", &bundled(), &ScoringConfig::default());
        assert_eq!(result.category, Category::Bug);
    }

    #[test]
    fn test_category_parses_folder_names() {
        assert_eq!("bug".parse::<Category>(), Ok(Category::Bug));
        assert_eq!("Enhancement".parse::<Category>(), Ok(Category::Enhancement));
        assert!("misc".parse::<Category>().is_err());
    }
}
