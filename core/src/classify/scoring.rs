//! Scoring primitive shared by the category classifier and the keyword
//! suitability strategy.

use std::collections::BTreeMap;

use crate::config::ScoringConfig;
use crate::rules::{padded, KeyRules, RuleKey, RuleSet};

/// Text prepared once and scored against every key.
#[derive(Debug, Clone)]
pub struct ScoringInput {
    padded: String,
    lowercase: String,
    labels: Vec<String>,
}

impl ScoringInput {
    pub fn new(text: &str, labels: &[String]) -> Self {
        Self {
            padded: padded(text),
            lowercase: text.to_lowercase(),
            labels: labels.iter().map(|l| l.to_lowercase()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyScore<K> {
    pub key: K,
    pub raw: f64,
    pub max: f64,
    pub normalized: f64,
    pub matched: Vec<String>,
}

/// Result of scoring one input against a whole rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome<K> {
    pub winner: K,
    pub confidence: f64,
    pub matched_terms: Vec<String>,
    pub excluded_terms: Vec<String>,
    pub scores: BTreeMap<K, f64>,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn score_key<K: RuleKey>(
    input: &ScoringInput,
    rules: &KeyRules<K>,
    set: &RuleSet<K>,
    exclusion_hits: usize,
    config: &ScoringConfig,
) -> KeyScore<K> {
    let is_fallback = rules.key == K::fallback();
    let mut raw = 0.0;
    let mut max = rules.keyword_weight();
    let mut matched = Vec::new();

    for keyword in &rules.keywords {
        if !is_fallback && set.is_excluded(&keyword.term) {
            continue;
        }
        if keyword.term.is_in(&input.padded) {
            raw += keyword.weight;
            matched.push(keyword.term.as_str().to_owned());
        }
    }

    if !rules.templates.is_empty() {
        max += config.template_bonus;
        if let Some(template) = rules.templates.iter().find(|t| t.is_match(&input.lowercase)) {
            raw += config.template_bonus;
            matched.push(format!("template:{}", template.as_str()));
        }
    }

    if !rules.label_hints.is_empty() {
        max += config.label_bonus;
        let hit = rules
            .label_hints
            .iter()
            .find(|hint| input.labels.iter().any(|label| label.contains(hint.as_str())));
        if let Some(hint) = hit {
            raw += config.label_bonus;
            matched.push(format!("label:{hint}"));
        }
    }

    if !is_fallback {
        raw -= config.exclusion_penalty * exclusion_hits as f64;
    }

    let normalized = if max > 0.0 {
        (raw / max).clamp(0.0, 1.0)
    } else {
        0.0
    };

    KeyScore {
        key: rules.key,
        raw,
        max,
        normalized,
        matched,
    }
}

/// Score `input` against every key of `set` and pick the winner.
///
/// A key wins when its raw score is positive, its normalized score reaches
/// `min_confidence`, and no other such key scores higher. Scores equal to
/// three decimals fall back to `K::ALL` order. With no winner the fallback
/// key is returned with its own normalized score.
pub fn score<K: RuleKey>(input: &ScoringInput, set: &RuleSet<K>, config: &ScoringConfig) -> ScoreOutcome<K> {
    let excluded_terms: Vec<String> = set
        .exclusions()
        .iter()
        .filter(|t| t.is_in(&input.padded))
        .map(|t| t.as_str().to_owned())
        .collect();

    let key_scores: Vec<KeyScore<K>> = K::ALL
        .iter()
        .filter_map(|key| set.rules_for(*key))
        .map(|rules| score_key(input, rules, set, excluded_terms.len(), config))
        .collect();

    let scores = key_scores.iter().map(|s| (s.key, s.normalized)).collect();

    let winner = key_scores
        .iter()
        .filter(|s| s.raw > 0.0 && s.normalized >= config.min_confidence)
        .min_by(|a, b| {
            round3(b.normalized)
                .total_cmp(&round3(a.normalized))
                .then_with(|| priority(a.key).cmp(&priority(b.key)))
        });

    match winner {
        Some(best) => ScoreOutcome {
            winner: best.key,
            confidence: best.normalized,
            matched_terms: best.matched.clone(),
            excluded_terms,
            scores,
        },
        None => {
            let fallback = key_scores.iter().find(|s| s.key == K::fallback());
            ScoreOutcome {
                winner: K::fallback(),
                confidence: fallback.map_or(0.0, |s| s.normalized),
                matched_terms: fallback.map(|s| s.matched.clone()).unwrap_or_default(),
                excluded_terms,
                scores,
            }
        }
    }
}

fn priority<K: RuleKey>(key: K) -> usize {
    K::ALL.iter().position(|k| *k == key).unwrap_or(usize::MAX)
}
