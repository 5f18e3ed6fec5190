//! Weighted keyword rule sets.
//!
//! A [`RuleSet`] maps each rule key (a category, or a side of the
//! suitability decision) to its weighted terms, template patterns and
//! label hints, plus one shared list of exclusion terms. Rule sets are
//! plain values: they are built once at startup and handed to every
//! scorer behind an `Arc`.
//!
//! Rule files are JSON:
//!
//! ```json
//! {
//!   "tiers": { "high": 3.0, "medium": 2.0, "low": 1.0 },
//!   "rules": {
//!     "bug": {
//!       "keywords": { "high": ["crash"], "low": ["cleanup"] },
//!       "weighted": [{ "term": "segfault", "weight": 4.0 }],
//!       "templates": ["bug\\s+report\\s+template"],
//!       "label_hints": ["bug"]
//!     }
//!   },
//!   "exclusions": ["question", "discussion"]
//! }
//! ```

use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::hash::Hash;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("IO error reading rules: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid rule file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid template pattern '{pattern}': {message}")]
    Template { pattern: String, message: String },
    #[error("Unknown weight tier '{tier}' for rule key '{key}'")]
    UnknownTier { key: String, tier: String },
    #[error("Weight for term '{term}' must be positive, got {weight}")]
    InvalidWeight { term: String, weight: f64 },
}

/// A key that a rule list scores.
///
/// `ALL` is in priority order: when two keys tie, the one listed first
/// wins. The fallback key is chosen when no key clears the threshold and
/// is never penalized by exclusion terms.
pub trait RuleKey:
    Copy + Ord + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const ALL: &'static [Self];

    /// Bundled default rule file for this key type.
    const BUNDLED_RULES: &'static str;

    fn fallback() -> Self;
}

/// Lowercase, turn every non-alphanumeric character into a space and
/// collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A single matchable term.
///
/// ASCII terms match whole words (or whole word sequences); terms with
/// non-ASCII characters match as substrings, since CJK text has no word
/// breaks to anchor on.
#[derive(Debug, Clone)]
pub struct Term {
    raw: String,
    /// Padded with spaces for ASCII terms, bare for substring terms.
    needle: String,
}

impl Term {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize(raw);
        let needle = if !normalized.is_ascii() || normalized.is_empty() {
            normalized
        } else {
            format!(" {normalized} ")
        };
        Self {
            raw: raw.trim().to_owned(),
            needle,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match against text produced by [`padded`].
    pub fn is_in(&self, padded_text: &str) -> bool {
        if self.needle.trim().is_empty() {
            return false;
        }
        padded_text.contains(self.needle.as_str())
    }

    fn key(&self) -> &str {
        self.needle.trim()
    }
}

/// Normalized text with a leading and trailing space, ready for
/// [`Term::is_in`].
pub fn padded(text: &str) -> String {
    format!(" {} ", normalize(text))
}

#[derive(Debug, Clone)]
pub struct WeightedTerm {
    pub term: Term,
    pub weight: f64,
}

/// Everything that scores one key.
#[derive(Debug, Clone)]
pub struct KeyRules<K> {
    pub key: K,
    pub keywords: Vec<WeightedTerm>,
    pub templates: Vec<Regex>,
    pub label_hints: Vec<String>,
}

impl<K> KeyRules<K> {
    pub fn keyword_weight(&self) -> f64 {
        self.keywords.iter().map(|k| k.weight).sum()
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet<K: RuleKey> {
    rules: BTreeMap<K, KeyRules<K>>,
    exclusions: Vec<Term>,
    excluded_keys: BTreeSet<String>,
}

impl<K: RuleKey> RuleSet<K> {
    /// The rule set compiled into the binary.
    pub fn bundled() -> Result<Self, RuleError> {
        Self::from_json(K::BUNDLED_RULES)
    }

    /// Load a rule file, replacing the bundled defaults entirely.
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let content = fs::read_to_string(path)?;
        let set = Self::from_json(&content)?;
        log::info!(
            "[rules] Loaded {} rule keys and {} exclusions from {}",
            set.rules.len(),
            set.exclusions.len(),
            path.display()
        );
        Ok(set)
    }

    pub fn from_json(json: &str) -> Result<Self, RuleError> {
        let file: RuleFile<K> = serde_json::from_str(json)?;
        Self::from_file(file)
    }

    pub fn from_file(file: RuleFile<K>) -> Result<Self, RuleError> {
        let tiers = if file.tiers.is_empty() {
            default_tiers()
        } else {
            file.tiers
        };

        let mut rules = BTreeMap::new();
        for (key, table) in file.rules {
            let mut by_term: BTreeMap<String, WeightedTerm> = BTreeMap::new();
            let mut order: Vec<String> = Vec::new();

            let tiered = table.keywords.iter().flat_map(|(tier, terms)| {
                terms.iter().map(move |t| (tier.as_str(), t.as_str()))
            });
            let mut pairs: Vec<(String, f64)> = Vec::new();
            for (tier, term) in tiered {
                let weight = tiers.get(tier).copied().ok_or_else(|| RuleError::UnknownTier {
                    key: key.to_string(),
                    tier: tier.to_owned(),
                })?;
                pairs.push((term.to_owned(), weight));
            }
            pairs.extend(table.weighted.into_iter().map(|w| (w.term, w.weight)));

            for (raw, weight) in pairs {
                if weight <= 0.0 || !weight.is_finite() {
                    return Err(RuleError::InvalidWeight { term: raw, weight });
                }
                let term = Term::new(&raw);
                let dedup_key = term.key().to_owned();
                if dedup_key.is_empty() {
                    continue;
                }
                // Same term listed in several tiers keeps its highest weight.
                match by_term.get_mut(&dedup_key) {
                    Some(existing) => existing.weight = existing.weight.max(weight),
                    None => {
                        order.push(dedup_key.clone());
                        by_term.insert(dedup_key, WeightedTerm { term, weight });
                    }
                }
            }

            let keywords = order
                .into_iter()
                .filter_map(|k| by_term.remove(&k))
                .collect();

            let templates = table
                .templates
                .iter()
                .map(|pattern| {
                    RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| RuleError::Template {
                            pattern: pattern.clone(),
                            message: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let label_hints = table
                .label_hints
                .iter()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect();

            rules.insert(
                key,
                KeyRules {
                    key,
                    keywords,
                    templates,
                    label_hints,
                },
            );
        }

        let exclusions: Vec<Term> = file
            .exclusions
            .iter()
            .map(|t| Term::new(t))
            .filter(|t| !t.key().is_empty())
            .collect();
        let excluded_keys = exclusions.iter().map(|t| t.key().to_owned()).collect();

        Ok(Self {
            rules,
            exclusions,
            excluded_keys,
        })
    }

    /// Rules for `key`, if the set has any.
    pub fn rules_for(&self, key: K) -> Option<&KeyRules<K>> {
        self.rules.get(&key)
    }

    pub fn exclusions(&self) -> &[Term] {
        &self.exclusions
    }

    /// Whether `term` is also listed as an exclusion.
    pub fn is_excluded(&self, term: &Term) -> bool {
        self.excluded_keys.contains(term.key())
    }
}

fn default_tiers() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("high".to_owned(), 3.0),
        ("medium".to_owned(), 2.0),
        ("low".to_owned(), 1.0),
    ])
}

/// On-disk rule file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "K: RuleKey"))]
pub struct RuleFile<K: RuleKey> {
    #[serde(default)]
    pub tiers: BTreeMap<String, f64>,
    pub rules: BTreeMap<K, KeyRuleSpec>,
    #[serde(default)]
    pub exclusions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRuleSpec {
    #[serde(default)]
    pub keywords: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub weighted: Vec<WeightedTermSpec>,
    #[serde(default)]
    pub templates: Vec<String>,
    #[serde(default)]
    pub label_hints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedTermSpec {
    pub term: String,
    pub weight: f64,
}
