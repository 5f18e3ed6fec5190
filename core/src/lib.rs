//! Issue classification and programming-exercise suitability analysis.
//!
//! Issues read by [`sources`] are classified into a category by
//! [`classify`] and judged for suitability by a
//! [`verdict::VerdictProvider`]. The [`orchestrator`] runs a batch with
//! bounded concurrency, gates work through the [`ledger`] and produces the
//! [`report`].

pub mod ai;
pub mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod issue;
pub mod ledger;
pub mod orchestrator;
pub mod references;
pub mod report;
pub mod rules;
pub mod sources;
pub mod verdict;
