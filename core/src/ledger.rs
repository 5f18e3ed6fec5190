//! Disk-backed record of which (issue, method) pairs have been evaluated.
//!
//! The file is JSON Lines, one [`LedgerEntry`] per line. Loading replays
//! the lines in order so a later line for the same key replaces an earlier
//! one. New records are appended by [`Ledger::flush`]; [`Ledger::compact`]
//! rewrites the file with one line per key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::verdict::{Method, SuitabilityVerdict};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt ledger entry at line {line}: {message}")]
    Corrupt { line: usize, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub issue_id: u64,
    pub method: Method,
    pub evaluated_at: DateTime<Utc>,
    pub verdict_hash: String,
    pub verdict: SuitabilityVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Updated,
    /// Same verdict hash as the stored entry; nothing changed.
    Unchanged,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<(u64, Method), LedgerEntry>,
    pending: Vec<(u64, Method)>,
    corruptions: Vec<LedgerError>,
    /// The file ends in a partial line, so the next append must start on
    /// a fresh one.
    needs_newline: bool,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger, and
    /// unparsable lines are skipped with a warning.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
            pending: Vec::new(),
            corruptions: Vec::new(),
            needs_newline: false,
        };

        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ledger),
            Err(e) => return Err(e.into()),
        };
        ledger.needs_newline = content.last().is_some_and(|b| *b != b'\n');

        // Split on raw bytes: an interrupted append can cut a multi-byte
        // character, which must only cost that one line.
        for (index, line) in content.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<LedgerEntry>(line) {
                Ok(entry) => {
                    ledger.entries.insert((entry.issue_id, entry.method), entry);
                }
                Err(e) => {
                    let err = LedgerError::Corrupt {
                        line: index + 1,
                        message: e.to_string(),
                    };
                    log::warn!("[ledger] Skipping entry in {}: {err}", path.display());
                    ledger.corruptions.push(err);
                }
            }
        }

        log::info!(
            "[ledger] Loaded {} entries from {}",
            ledger.entries.len(),
            path.display()
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines skipped during [`Ledger::load`].
    pub fn corruptions(&self) -> &[LedgerError] {
        &self.corruptions
    }

    pub fn has_been_evaluated(&self, issue_id: u64, method: Method) -> bool {
        self.entries.contains_key(&(issue_id, method))
    }

    pub fn get(&self, issue_id: u64, method: Method) -> Option<&LedgerEntry> {
        self.entries.get(&(issue_id, method))
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.values()
    }

    /// Store `verdict` for `(issue_id, method)`. An identical verdict keeps
    /// the existing entry and its timestamp.
    pub fn record(&mut self, issue_id: u64, method: Method, verdict: &SuitabilityVerdict) -> RecordOutcome {
        let verdict_hash = verdict.content_hash();
        let key = (issue_id, method);
        let outcome = match self.entries.get(&key) {
            Some(existing) if existing.verdict_hash == verdict_hash => return RecordOutcome::Unchanged,
            Some(_) => RecordOutcome::Updated,
            None => RecordOutcome::Inserted,
        };

        self.entries.insert(
            key,
            LedgerEntry {
                issue_id,
                method,
                evaluated_at: Utc::now(),
                verdict_hash,
                verdict: verdict.clone(),
            },
        );
        if !self.pending.contains(&key) {
            self.pending.push(key);
        }
        outcome
    }

    /// Append records made since the last flush and sync the file.
    pub fn flush(&mut self) -> Result<(), LedgerError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut buf = String::new();
        if self.needs_newline {
            buf.push('\n');
        }
        for key in &self.pending {
            if let Some(entry) = self.entries.get(key) {
                buf.push_str(&serde_json::to_string(entry)?);
                buf.push('\n');
            }
        }

        // A write that fails partway leaves a partial line behind.
        self.needs_newline = true;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;

        log::debug!("[ledger] Appended {} entries", self.pending.len());
        self.pending.clear();
        self.needs_newline = false;
        Ok(())
    }

    /// Rewrite the file with exactly one line per key (atomic: write tmp +
    /// rename).
    pub fn compact(&mut self) -> Result<(), LedgerError> {
        if self.entries.is_empty() && !self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut tmp_name = OsString::from(self.path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut content = String::new();
        for entry in self.entries.values() {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }
        let mut file = File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        self.pending.clear();
        self.needs_newline = false;
        log::info!(
            "[ledger] Compacted {} entries into {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn verdict(suitable: bool, reason: &str) -> SuitabilityVerdict {
        SuitabilityVerdict {
            suitable,
            method: Method::Llm,
            confidence: 0.6,
            certainty: None,
            reason: reason.to_owned(),
            source_labels: BTreeSet::new(),
        }
    }

    fn line_count(path: &Path) -> usize {
        fs::read_to_string(path).unwrap().lines().count()
    }

    #[test]
    fn test_record_then_lookup() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(&dir.path().join("ledger.jsonl")).unwrap();
        assert!(ledger.is_empty());
        ledger.record(1, Method::Llm, &verdict(true, "ok"));
        assert!(ledger.has_been_evaluated(1, Method::Llm));
        assert!(!ledger.has_been_evaluated(1, Method::Keyword));
        assert!(!ledger.has_been_evaluated(2, Method::Llm));
    }

    #[test]
    fn test_identical_record_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(&dir.path().join("ledger.jsonl")).unwrap();
        assert_eq!(ledger.record(1, Method::Llm, &verdict(true, "ok")), RecordOutcome::Inserted);
        let stamp = ledger.get(1, Method::Llm).unwrap().evaluated_at;
        assert_eq!(ledger.record(1, Method::Llm, &verdict(true, "ok")), RecordOutcome::Unchanged);
        assert_eq!(ledger.get(1, Method::Llm).unwrap().evaluated_at, stamp);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_different_verdict_overwrites() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(&dir.path().join("ledger.jsonl")).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "ok"));
        assert_eq!(
            ledger.record(1, Method::Llm, &verdict(false, "changed")),
            RecordOutcome::Updated
        );
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.get(1, Method::Llm).unwrap().verdict.suitable);
    }

    #[test]
    fn test_flush_then_reload_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "a"));
        ledger.record(2, Method::Keyword, &verdict(false, "b"));
        ledger.flush().unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        for (id, method) in [(1, Method::Llm), (2, Method::Keyword), (1, Method::Keyword), (3, Method::Llm)] {
            assert_eq!(
                reloaded.has_been_evaluated(id, method),
                ledger.has_been_evaluated(id, method)
            );
        }
        assert_eq!(reloaded.get(1, Method::Llm), ledger.get(1, Method::Llm));
    }

    #[test]
    fn test_flush_appends_and_later_lines_win() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "first"));
        ledger.flush().unwrap();
        ledger.record(1, Method::Llm, &verdict(false, "second"));
        ledger.flush().unwrap();
        assert_eq!(line_count(&path), 2);

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(1, Method::Llm).unwrap().verdict.reason, "second");
    }

    #[test]
    fn test_compact_keeps_one_line_per_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "first"));
        ledger.flush().unwrap();
        ledger.record(1, Method::Llm, &verdict(false, "second"));
        ledger.record(2, Method::Llm, &verdict(true, "other"));
        ledger.flush().unwrap();
        assert_eq!(line_count(&path), 3);

        ledger.compact().unwrap();
        assert_eq!(line_count(&path), 2);
        assert!(!dir.path().join("ledger.jsonl.tmp").exists());
        assert_eq!(Ledger::load(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_truncated_tail_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "kept"));
        ledger.flush().unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"issue_id": 2, "method": "llm", "evalu"#).unwrap();
        drop(file);

        let mut reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.corruptions().len(), 1);
        assert!(matches!(reloaded.corruptions()[0], LedgerError::Corrupt { line: 2, .. }));

        // The next append starts on its own line.
        reloaded.record(3, Method::Llm, &verdict(false, "after"));
        reloaded.flush().unwrap();
        let again = Ledger::load(&path).unwrap();
        assert!(again.has_been_evaluated(1, Method::Llm));
        assert!(again.has_been_evaluated(3, Method::Llm));
        assert_eq!(again.corruptions().len(), 1);
    }

    #[test]
    fn test_tail_cut_inside_multibyte_char_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "算法实现"));
        ledger.flush().unwrap();

        let partial = r#"{"issue_id":2,"method":"llm","reason":"崩溃"#.as_bytes();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&partial[..partial.len() - 1]).unwrap();
        drop(file);

        let mut reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(1, Method::Llm).unwrap().verdict.reason, "算法实现");
        assert_eq!(reloaded.corruptions().len(), 1);
        assert!(matches!(reloaded.corruptions()[0], LedgerError::Corrupt { line: 2, .. }));

        reloaded.record(3, Method::Llm, &verdict(false, "之后"));
        reloaded.flush().unwrap();
        let again = Ledger::load(&path).unwrap();
        assert_eq!(again.len(), 2);
        assert!(again.has_been_evaluated(3, Method::Llm));
    }

    #[test]
    fn test_failed_flush_starts_next_append_on_fresh_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.record(1, Method::Llm, &verdict(true, "kept"));

        // A directory in the ledger's place makes the append fail.
        fs::create_dir(&path).unwrap();
        assert!(ledger.flush().is_err());
        fs::remove_dir(&path).unwrap();

        // Bytes a partial write could have left behind.
        fs::write(&path, br#"{"issue_id": 1, "meth"#).unwrap();
        ledger.flush().unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        assert!(reloaded.has_been_evaluated(1, Method::Llm));
        assert_eq!(reloaded.corruptions().len(), 1);
    }

    #[test]
    fn test_flush_without_records_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.flush().unwrap();
        ledger.compact().unwrap();
        assert!(!path.exists());
    }
}
