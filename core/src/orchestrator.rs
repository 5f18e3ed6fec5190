//! Drives one analysis run over a batch of issues.
//!
//! Evaluations run concurrently up to a fixed limit. Results come back to
//! a single consumer loop which owns the ledger, so ledger writes never
//! race. A shutdown future (timeout or Ctrl-C) stops the run early; issues
//! that did not finish are reported as unresolved.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use crate::classify::{classify_issue, Category, ClassificationResult};
use crate::config::ScoringConfig;
use crate::issue::Issue;
use crate::ledger::{Ledger, LedgerError};
use crate::report::{Report, ReportEntry, UnresolvedIssue};
use crate::rules::RuleSet;
use crate::verdict::{EvaluationContext, Method, SuitabilityVerdict, VerdictProvider};

/// Error text recorded for issues a shutdown cut off.
pub const INTERRUPTED: &str = "interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-evaluate issues the ledger already holds.
    pub force_refresh: bool,
    pub concurrency: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IssueOutcome {
    /// Evaluated in this run.
    Evaluated(SuitabilityVerdict),
    /// Reused from the ledger.
    Skipped(SuitabilityVerdict),
    Unresolved(String),
}

impl IssueOutcome {
    pub fn verdict(&self) -> Option<&SuitabilityVerdict> {
        match self {
            Self::Evaluated(v) | Self::Skipped(v) => Some(v),
            Self::Unresolved(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssueResult {
    pub issue: Issue,
    pub classification: ClassificationResult,
    pub outcome: IssueOutcome,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub method: Method,
    /// One result per distinct issue, in input order.
    pub results: Vec<IssueResult>,
    pub evaluated: usize,
    pub skipped: usize,
    pub unresolved: usize,
    /// Judge requests made during this run, retries included.
    pub llm_calls: u64,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn resolved(&self) -> usize {
        self.evaluated + self.skipped
    }

    pub fn unresolved_issues(&self) -> Vec<UnresolvedIssue> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                IssueOutcome::Unresolved(error) => Some(UnresolvedIssue {
                    issue_id: r.issue.id,
                    error: error.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Report for this run alone; merge a previous report into it to keep
    /// older entries.
    pub fn to_report(&self) -> Report {
        let entries: BTreeMap<u64, ReportEntry> = self
            .results
            .iter()
            .filter_map(|r| {
                let verdict = r.outcome.verdict()?;
                Some((
                    r.issue.id,
                    ReportEntry {
                        title: r.issue.title.clone(),
                        suitable: verdict.suitable,
                        reason: verdict.reason.clone(),
                        labels: r.issue.label_list(),
                        category: r.classification.category,
                        category_confidence: r.classification.confidence,
                        confidence: verdict.confidence,
                        method: verdict.method,
                    },
                ))
            })
            .collect();
        Report::new(self.method, entries, self.unresolved_issues())
    }
}

pub struct Orchestrator {
    provider: Arc<VerdictProvider>,
    category_rules: Arc<RuleSet<Category>>,
    scoring: ScoringConfig,
    context: EvaluationContext,
    options: RunOptions,
}

/// Drop repeated ids, keeping the first occurrence.
fn dedupe(issues: Vec<Issue>) -> Vec<Issue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| {
            let first = seen.insert(issue.id);
            if !first {
                log::warn!("[orchestrator] Duplicate issue #{} ignored", issue.id);
            }
            first
        })
        .collect()
}

impl Orchestrator {
    pub fn new(
        provider: Arc<VerdictProvider>,
        category_rules: Arc<RuleSet<Category>>,
        scoring: ScoringConfig,
        context: EvaluationContext,
        options: RunOptions,
    ) -> Self {
        Self {
            provider,
            category_rules,
            scoring,
            context,
            options,
        }
    }

    /// Evaluate `issues`, recording each verdict in `ledger` as it arrives.
    ///
    /// Per-issue failures never abort the run. The ledger is flushed after
    /// every recorded verdict and compacted before returning, including
    /// after a shutdown; only the final compaction can fail the run.
    pub async fn run<S>(&self, issues: Vec<Issue>, ledger: &mut Ledger, shutdown: S) -> Result<RunSummary, LedgerError>
    where
        S: Future<Output = ()>,
    {
        let method = self.provider.method();
        let calls_before = self.provider.llm_calls();
        let issues = dedupe(issues);

        let mut outcomes: Vec<Option<IssueOutcome>> = issues
            .iter()
            .map(|issue| {
                if self.options.force_refresh {
                    return None;
                }
                ledger
                    .get(issue.id, method)
                    .map(|entry| IssueOutcome::Skipped(entry.verdict.clone()))
            })
            .collect();

        let pending: Vec<usize> = (0..issues.len()).filter(|i| outcomes[*i].is_none()).collect();
        log::info!(
            "[orchestrator] {} issues: {} to evaluate with {method}, {} reused from ledger",
            issues.len(),
            pending.len(),
            issues.len() - pending.len()
        );

        let provider = &self.provider;
        let context = &self.context;
        let issues_ref = &issues;
        let mut results = stream::iter(pending)
            .map(|index| async move {
                let result = provider.evaluate(&issues_ref[index], context).await;
                (index, result)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        tokio::pin!(shutdown);
        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    log::warn!("[orchestrator] Shutdown requested, abandoning in-flight evaluations");
                    interrupted = true;
                    break;
                }
                next = results.next() => {
                    let Some((index, result)) = next else {
                        break;
                    };
                    let issue = &issues[index];
                    let outcome = match result {
                        Ok(verdict) => {
                            log::info!(
                                "[orchestrator] #{} {}: {}",
                                issue.id,
                                if verdict.suitable { "suitable" } else { "not suitable" },
                                verdict.reason
                            );
                            ledger.record(issue.id, method, &verdict);
                            if let Err(e) = ledger.flush() {
                                log::error!("[orchestrator] Ledger flush failed after #{}: {e}", issue.id);
                            }
                            IssueOutcome::Evaluated(verdict)
                        }
                        Err(e) => {
                            log::warn!("[orchestrator] #{} unresolved: {e}", issue.id);
                            IssueOutcome::Unresolved(e.to_string())
                        }
                    };
                    outcomes[index] = Some(outcome);
                }
            }
        }
        drop(results);

        ledger.flush()?;
        ledger.compact()?;

        let mut summary = RunSummary {
            method,
            results: Vec::with_capacity(issues.len()),
            evaluated: 0,
            skipped: 0,
            unresolved: 0,
            llm_calls: self.provider.llm_calls() - calls_before,
            interrupted,
        };
        for (issue, outcome) in issues.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| IssueOutcome::Unresolved(INTERRUPTED.to_owned()));
            match outcome {
                IssueOutcome::Evaluated(_) => summary.evaluated += 1,
                IssueOutcome::Skipped(_) => summary.skipped += 1,
                IssueOutcome::Unresolved(_) => summary.unresolved += 1,
            }
            let classification = classify_issue(&issue, &self.category_rules, &self.scoring);
            summary.results.push(IssueResult {
                issue,
                classification,
                outcome,
            });
        }

        log::info!(
            "[orchestrator] Done: {} resolved ({} evaluated, {} reused), {} unresolved, {} LLM calls",
            summary.resolved(),
            summary.evaluated,
            summary.skipped,
            summary.unresolved,
            summary.llm_calls
        );
        Ok(summary)
    }
}
