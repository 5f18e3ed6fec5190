//! Few-shot reference examples for the LLM prompt.
//!
//! A reference directory holds markdown files describing issues that were
//! previously judged. Files under a `suitable/` or `unsuitable/`
//! subdirectory carry that judgment; any other file counts as a suitable
//! example.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::ai::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceLabel {
    Suitable,
    Unsuitable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceExample {
    /// File name the example was read from.
    pub name: String,
    pub label: ReferenceLabel,
    pub content: String,
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

fn label_for(root: &Path, path: &Path) -> ReferenceLabel {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let unsuitable = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .any(|c| c.as_os_str().eq_ignore_ascii_case("unsuitable"));
    if unsuitable {
        ReferenceLabel::Unsuitable
    } else {
        ReferenceLabel::Suitable
    }
}

/// Alternate suitable and unsuitable examples, keeping path order within
/// each label, so a prompt that takes the first few sees both kinds.
fn interleave_labels(examples: Vec<ReferenceExample>) -> Vec<ReferenceExample> {
    let (suitable, unsuitable): (Vec<_>, Vec<_>) = examples
        .into_iter()
        .partition(|e| e.label == ReferenceLabel::Suitable);
    let mut suitable = suitable.into_iter();
    let mut unsuitable = unsuitable.into_iter();
    let mut out = Vec::with_capacity(suitable.len() + unsuitable.len());
    loop {
        match (suitable.next(), unsuitable.next()) {
            (None, None) => break,
            (a, b) => out.extend(a.into_iter().chain(b)),
        }
    }
    out
}

/// Load every markdown example under `dir`, each cut to `max_chars`
/// characters (with a trailing `...` when cut). Files are read in path
/// order and then interleaved by label.
///
/// A missing directory or an unreadable file is logged and skipped; the
/// LLM then runs with its generic criteria only.
pub fn load_references(dir: &Path, max_chars: usize) -> Vec<ReferenceExample> {
    if !dir.is_dir() {
        log::warn!(
            "[references] Reference directory {} not found, using generic criteria",
            dir.display()
        );
        return Vec::new();
    }

    let mut paths: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_markdown(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    paths.sort();

    let mut examples = Vec::new();
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("[references] Skipping {}: {e}", path.display());
                continue;
            }
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        let truncated = truncate_chars(content, max_chars);
        let content = if truncated.len() < content.len() {
            format!("{truncated}...")
        } else {
            truncated.to_owned()
        };
        examples.push(ReferenceExample {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            label: label_for(dir, &path),
            content,
        });
    }

    log::info!(
        "[references] Loaded {} reference examples from {}",
        examples.len(),
        dir.display()
    );
    interleave_labels(examples)
}
