//! LLM-backed suitability strategy: prompt, parse, retry.

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::prompt::build_suitability_prompt;
use super::{Certainty, EvaluationContext, Method, SuitabilityVerdict, VerdictError};
use crate::ai::{extract_json_str, truncate_chars, Judge};
use crate::config::{LlmConfig, RetryPolicy};
use crate::issue::Issue;

/// A reply reduced to the fields a verdict needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub suitable: bool,
    pub reason: String,
    pub confidence: Option<f64>,
    pub certainty: Option<Certainty>,
}

#[derive(Deserialize)]
struct JsonReply {
    suitable: bool,
    reason: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    certainty: Option<String>,
}

fn parse_certainty(raw: &str) -> Option<Certainty> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" => Some(Certainty::Low),
        "medium" | "moderate" => Some(Certainty::Medium),
        "high" => Some(Certainty::High),
        _ => None,
    }
}

/// `SUITABLE: true|false - reason` on any line of the reply.
fn parse_line_format(reply: &str) -> Option<ParsedReply> {
    for line in reply.lines() {
        // ASCII lowercasing keeps byte offsets aligned with `line`.
        let lower = line.to_ascii_lowercase();
        let Some(pos) = lower.match_indices("suitable:").map(|(pos, _)| pos).find(|&pos| {
            lower[..pos]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric())
        }) else {
            continue;
        };
        let rest = line[pos + "suitable:".len()..].trim_start_matches(|c: char| c == '*' || c.is_whitespace());
        let rest_lower = rest.to_ascii_lowercase();
        let (suitable, after) = if rest_lower.starts_with("true") {
            (true, &rest[4..])
        } else if rest_lower.starts_with("false") {
            (false, &rest[5..])
        } else {
            continue;
        };
        let reason = after.trim_start().strip_prefix('-').unwrap_or(after).trim();
        if reason.is_empty() {
            continue;
        }
        return Some(ParsedReply {
            suitable,
            reason: reason.to_owned(),
            confidence: None,
            certainty: None,
        });
    }
    None
}

/// Parse a judge reply. Anything that is neither a verdict object nor a
/// `SUITABLE:` line is an error; there is no default verdict.
pub fn parse_reply(reply: &str) -> Result<ParsedReply, VerdictError> {
    if let Some(json) = extract_json_str(reply) {
        if let Ok(parsed) = serde_json::from_str::<JsonReply>(json) {
            let reason = parsed.reason.trim().to_owned();
            if reason.is_empty() {
                return Err(VerdictError::Parse("reply has an empty reason".to_owned()));
            }
            return Ok(ParsedReply {
                suitable: parsed.suitable,
                reason,
                confidence: parsed
                    .confidence
                    .filter(|c| c.is_finite())
                    .map(|c| c.clamp(0.0, 1.0)),
                certainty: parsed.certainty.as_deref().and_then(parse_certainty),
            });
        }
    }

    parse_line_format(reply).ok_or_else(|| {
        VerdictError::Parse(format!(
            "expected a verdict object or a SUITABLE line, got: {}",
            truncate_chars(reply.trim(), 200)
        ))
    })
}

pub struct LlmStrategy {
    judge: Arc<dyn Judge>,
    retry: RetryPolicy,
    config: LlmConfig,
    calls: AtomicU64,
}

impl LlmStrategy {
    pub fn new(judge: Arc<dyn Judge>, retry: RetryPolicy, config: LlmConfig) -> Self {
        Self {
            judge,
            retry,
            config,
            calls: AtomicU64::new(0),
        }
    }

    /// Judge requests made so far, retries included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn attempt(&self, prompt: &str) -> Result<ParsedReply, VerdictError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let reply = self.judge.judge(prompt).await?;
        parse_reply(&reply)
    }

    /// Wait before the next attempt: the backoff delay, or the server's
    /// Retry-After when that is longer.
    fn retry_delay(&self, err: &VerdictError, attempts: u32) -> Duration {
        let backoff = self.retry.backoff_delay(attempts.saturating_sub(1));
        match err {
            VerdictError::Judge(e) => e.retry_after().map_or(backoff, |ra| ra.max(backoff)),
            _ => backoff,
        }
    }

    pub async fn evaluate(
        &self,
        issue: &Issue,
        ctx: &EvaluationContext,
    ) -> Result<SuitabilityVerdict, VerdictError> {
        let prompt = build_suitability_prompt(issue, &ctx.references, &self.config);
        let mut attempts = 0;

        loop {
            let err = match self.attempt(&prompt).await {
                Ok(parsed) => return Ok(into_verdict(parsed, issue)),
                Err(e) => e,
            };
            attempts += 1;

            if !err.is_retryable() {
                log::warn!("[llm] Issue #{} failed without retry: {err}", issue.id);
                return Err(err);
            }
            if attempts >= self.retry.max_attempts {
                return Err(VerdictError::Exhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = self.retry_delay(&err, attempts);
            log::warn!(
                "[llm] Issue #{} attempt {attempts}/{} via {} failed: {err}; retrying in {delay:?}",
                issue.id,
                self.retry.max_attempts,
                self.judge.name()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn into_verdict(parsed: ParsedReply, issue: &Issue) -> SuitabilityVerdict {
    let confidence = parsed
        .confidence
        .or_else(|| parsed.certainty.map(Certainty::bucket))
        .unwrap_or_else(|| Certainty::Medium.bucket());
    SuitabilityVerdict {
        suitable: parsed.suitable,
        method: Method::Llm,
        confidence,
        certainty: parsed.certainty,
        reason: format!("LLM analysis: {}", parsed.reason),
        source_labels: issue.labels.clone(),
    }
}
