//! The analysis report handed to the exercise generator.
//!
//! On disk the report is one JSON object: every issue id (as a string)
//! maps to a [`ReportEntry`], and a `metadata` key holds the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classify::Category;
use crate::verdict::Method;

const METADATA_KEY: &str = "metadata";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid report: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub title: String,
    pub suitable: bool,
    pub reason: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub category: Category,
    pub category_confidence: f64,
    pub confidence: f64,
    pub method: Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedIssue {
    pub issue_id: u64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_issues: usize,
    pub suitable_issues: usize,
    pub analysis_method: Method,
    /// Entries that are new or changed compared with the previous report.
    pub updated_issues: usize,
    #[serde(default)]
    pub unresolved: Vec<UnresolvedIssue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub entries: BTreeMap<u64, ReportEntry>,
    pub metadata: ReportMetadata,
}

/// `<base>.json`, `<base>_llm.json` or `<base>_hybrid.json`.
pub fn report_path(base: &Path, method: Method) -> PathBuf {
    let base = if base.extension().is_some_and(|e| e == "json") {
        base.with_extension("")
    } else {
        base.to_path_buf()
    };
    let suffix = match method {
        Method::Keyword => ".json",
        Method::Llm => "_llm.json",
        Method::Hybrid => "_hybrid.json",
    };
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl Report {
    pub fn new(method: Method, entries: BTreeMap<u64, ReportEntry>, unresolved: Vec<UnresolvedIssue>) -> Self {
        let mut report = Self {
            entries,
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                total_issues: 0,
                suitable_issues: 0,
                analysis_method: method,
                updated_issues: 0,
                unresolved,
            },
        };
        report.metadata.updated_issues = report.entries.len();
        report.refresh_counts();
        report
    }

    fn refresh_counts(&mut self) {
        self.metadata.total_issues = self.entries.len();
        self.metadata.suitable_issues = self.entries.values().filter(|e| e.suitable).count();
    }

    /// Keep `previous` entries this report does not replace, and count
    /// only new or changed entries as updated.
    pub fn merge_previous(&mut self, previous: Report) {
        let mut updated = 0;
        for (id, entry) in &self.entries {
            if previous.entries.get(id) != Some(entry) {
                updated += 1;
            }
        }
        for (id, entry) in previous.entries {
            self.entries.entry(id).or_insert(entry);
        }
        self.metadata.updated_issues = updated;
        self.refresh_counts();
    }

    /// Ids of suitable issues, ascending.
    pub fn suitable_ids(&self) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|(_, e)| e.suitable)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn to_json(&self) -> Result<Value, ReportError> {
        let mut map = Map::new();
        for (id, entry) in &self.entries {
            map.insert(id.to_string(), serde_json::to_value(entry)?);
        }
        map.insert(METADATA_KEY.to_owned(), serde_json::to_value(&self.metadata)?);
        Ok(Value::Object(map))
    }

    pub fn from_json(value: Value) -> Result<Self, ReportError> {
        let Value::Object(map) = value else {
            return Err(ReportError::Invalid("report is not a JSON object".to_owned()));
        };
        let mut entries = BTreeMap::new();
        let mut metadata = None;
        for (key, value) in map {
            if key == METADATA_KEY {
                metadata = Some(serde_json::from_value(value)?);
                continue;
            }
            let id = key
                .parse::<u64>()
                .map_err(|_| ReportError::Invalid(format!("non-numeric issue id '{key}'")))?;
            entries.insert(id, serde_json::from_value(value)?);
        }
        let metadata = metadata.ok_or_else(|| ReportError::Invalid("missing metadata".to_owned()))?;
        Ok(Self { entries, metadata })
    }

    /// Read a report; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ReportError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_str(&content)?;
        Self::from_json(value).map(Some)
    }

    /// Write the report (atomic: write tmp + rename).
    pub fn save(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = OsString::from(path.as_os_str());
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let content = serde_json::to_string_pretty(&self.to_json()?)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, path)?;
        log::info!(
            "[report] Saved {} issues ({} suitable) to {}",
            self.metadata.total_issues,
            self.metadata.suitable_issues,
            path.display()
        );
        Ok(())
    }
}
