//! Reads issues from the crawler's output tree.
//!
//! The input is a single file or a directory walked recursively. Markdown
//! files go through [`markdown::parse_markdown`]; `.json` files hold one
//! issue object or an array of them. The crawler sorts issues into
//! `open_issues/` or `closed_issues/` and then into `bug/`, `enhancement/`
//! or `other/`; those folder names fill in state and category when the
//! file itself does not say.

pub mod markdown;

use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::classify::Category;
use crate::issue::{Issue, IssueState};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Input path does not exist: {0}")]
    MissingInput(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid issue JSON in {path}: {message}")]
    Json { path: PathBuf, message: String },
}

/// Defaults implied by the folders above an issue file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderContext {
    pub state: Option<IssueState>,
    pub category: Option<Category>,
}

impl FolderContext {
    /// Read the directory components of `path`. The innermost matching
    /// folder wins.
    pub fn from_path(path: &Path) -> Self {
        let mut ctx = Self::default();
        let Some(parent) = path.parent() else {
            return ctx;
        };
        for component in parent.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let Some(name) = name.to_str() else {
                continue;
            };
            match name {
                "open_issues" | "closed_issues" => ctx.state = name.parse().ok(),
                "bug" | "enhancement" | "other" => ctx.category = name.parse().ok(),
                _ => {}
            }
        }
        ctx
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Markdown,
    Json,
}

fn file_kind(path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "md" | "markdown" => Some(FileKind::Markdown),
        "json" => Some(FileKind::Json),
        _ => None,
    }
}

fn issue_from_value(mut value: Value, path: &Path, ctx: &FolderContext) -> Result<Issue, SourceError> {
    let has_state = value.get("state").is_some();
    // Crawler JSON carries GitHub's `number`; accept it as the id.
    if let Value::Object(map) = &mut value {
        if !map.contains_key("id") {
            if let Some(number) = map.get("number").cloned() {
                map.insert("id".to_owned(), number);
            }
        }
    }
    let mut issue: Issue = serde_json::from_value(value).map_err(|e| SourceError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if !has_state {
        if let Some(state) = ctx.state {
            issue.state = state;
        }
    }
    if issue.folder_category.is_none() {
        issue.folder_category = ctx.category;
    }
    issue.source_path = Some(path.to_path_buf());
    Ok(issue)
}

fn parse_json(content: &str, path: &Path, ctx: &FolderContext) -> Result<Vec<Issue>, SourceError> {
    let value: Value = serde_json::from_str(content).map_err(|e| SourceError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| issue_from_value(item, path, ctx))
            .collect(),
        other => Ok(vec![issue_from_value(other, path, ctx)?]),
    }
}

/// Parse one issue file.
pub fn load_file(path: &Path) -> Result<Vec<Issue>, SourceError> {
    let Some(kind) = file_kind(path) else {
        return Ok(Vec::new());
    };
    let content = fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ctx = FolderContext::from_path(path);
    match kind {
        FileKind::Markdown => {
            let issues = markdown::parse_markdown(&content, path, &ctx);
            if issues.is_empty() {
                log::warn!("[sources] No issue id found in {}, skipping", path.display());
            }
            Ok(issues)
        }
        FileKind::Json => parse_json(&content, path, &ctx),
    }
}

/// Load every issue under `input`, in path order.
///
/// Only a missing input is an error; a file that cannot be read or parsed
/// is skipped with a warning so one bad file does not stop the batch.
pub fn load_issues(input: &Path) -> Result<Vec<Issue>, SourceError> {
    if !input.exists() {
        return Err(SourceError::MissingInput(input.to_path_buf()));
    }
    if input.is_file() {
        return load_file(input);
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && file_kind(e.path()).is_some())
        .map(walkdir::DirEntry::into_path)
        .collect();
    paths.sort();
    log::info!("[sources] Found {} issue files in {}", paths.len(), input.display());

    let mut issues = Vec::new();
    for path in paths {
        match load_file(&path) {
            Ok(found) => issues.extend(found),
            Err(e) => log::warn!("[sources] Skipping {}: {e}", path.display()),
        }
    }
    Ok(issues)
}
