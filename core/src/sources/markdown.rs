//! Parser for the crawler's markdown issue files.
//!
//! ```text
//! # Issue #123: Crash when saving
//! - **状态 (State)**: open
//! - **创建时间 (Created at)**: 2024-05-01 10:00:00
//! - **Labels**: bug, ui
//! - **GitHub 链接**: [View on GitHub](https://github.com/o/r/issues/123)
//! ---
//! ## 描述 (Description)
//!
//! Body text...
//! ```
//!
//! A file may hold several issues, each starting with its own header.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

use super::FolderContext;
use crate::issue::Issue;

/// Body the crawler writes for issues without a description.
const EMPTY_BODY_PLACEHOLDER: &str = "此 Issue 没有提供描述。";

/// `# Issue #12: Title`, `## #12 Title` and similar.
fn parse_header(line: &str) -> Option<(u64, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = trimmed[hashes..].trim_start();
    let rest = match rest.get(..5) {
        Some(word) if word.eq_ignore_ascii_case("issue") => rest[5..].trim_start(),
        _ => rest,
    };
    let rest = rest.strip_prefix('#')?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    let id = digits.parse().ok()?;
    let title = rest[digits.len()..]
        .trim_start_matches(|c: char| c == ':' || c == '：' || c == '-' || c.is_whitespace())
        .trim_end();
    Some((id, title.to_owned()))
}

/// `- **Key**: value`
fn parse_bullet(line: &str) -> Option<(&str, &str)> {
    let rest = line
        .trim_start()
        .strip_prefix("- ")
        .or_else(|| line.trim_start().strip_prefix("* "))?
        .trim_start()
        .strip_prefix("**")?;
    let end = rest.find("**")?;
    let key = rest[..end].trim();
    let value = rest[end + 2..]
        .trim_start()
        .strip_prefix(':')
        .or_else(|| rest[end + 2..].trim_start().strip_prefix('：'))?;
    Some((key, value.trim()))
}

/// Target of the first `[text](url)` link in `value`.
fn link_target(value: &str) -> Option<&str> {
    let start = value.find("](")? + 2;
    let len = value[start..].find(')')?;
    Some(value[start..start + len].trim())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_labels(value: &str) -> Vec<String> {
    let value = value.trim().trim_start_matches('[').trim_end_matches(']');
    value
        .split([',', '，'])
        .map(|l| l.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("none"))
        .map(str::to_owned)
        .collect()
}

fn apply_metadata(issue: &mut Issue, key: &str, value: &str) {
    let key = key.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| key.contains(n));

    if has(&["state", "状态"]) {
        if let Ok(state) = value.parse() {
            issue.state = state;
        }
    } else if has(&["created", "创建时间"]) {
        issue.created_at = parse_timestamp(value);
    } else if has(&["updated", "更新时间"]) {
        issue.updated_at = parse_timestamp(value);
    } else if has(&["label", "标签"]) {
        issue.labels = parse_labels(value).into_iter().collect();
    } else if has(&["link", "链接", "url"]) {
        if let Some(url) = link_target(value) {
            issue.url = url.to_owned();
        } else if value.starts_with("http") {
            value.clone_into(&mut issue.url);
        }
    }
}

fn parse_block(id: u64, title: String, lines: &[&str], ctx: &FolderContext) -> Issue {
    let mut issue = Issue::new(id, title, "");
    if let Some(state) = ctx.state {
        issue.state = state;
    }
    issue.folder_category = ctx.category;

    let separator = lines.iter().position(|l| l.trim() == "---");
    let (head, body_lines): (&[&str], &[&str]) = match separator {
        Some(i) => (&lines[..i], &lines[i + 1..]),
        None => (&[], lines),
    };

    let mut remaining = Vec::new();
    for line in head.iter().chain(if separator.is_none() { body_lines } else { &[] }) {
        match parse_bullet(line) {
            Some((key, value)) => apply_metadata(&mut issue, key, value),
            None if separator.is_none() => remaining.push(*line),
            None => {}
        }
    }

    let body_source: Vec<&str> = if separator.is_some() {
        body_lines.to_vec()
    } else {
        remaining
    };
    let mut body_iter = body_source.iter().skip_while(|l| l.trim().is_empty()).peekable();
    // A description heading directly after the separator is not body text.
    if body_iter.peek().is_some_and(|l| l.trim_start().starts_with('#')) {
        body_iter.next();
    }
    let body = body_iter.copied().collect::<Vec<_>>().join("\n");
    let body = body.trim();
    if body != EMPTY_BODY_PLACEHOLDER {
        body.clone_into(&mut issue.body);
    }
    issue
}

/// Id from a crawler file name such as `issue_123_Crash_on_save.md`.
pub fn id_from_filename(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix("issue_").or_else(|| stem.strip_prefix("issue-"))?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Parse every issue in one markdown document. Returns nothing when no id
/// can be found in the headers or the file name.
pub fn parse_markdown(content: &str, path: &Path, ctx: &FolderContext) -> Vec<Issue> {
    let lines: Vec<&str> = content.lines().collect();
    let headers: Vec<(usize, u64, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, l)| parse_header(l).map(|(id, title)| (i, id, title)))
        .collect();

    if headers.is_empty() {
        let Some(id) = id_from_filename(path) else {
            return Vec::new();
        };
        let title_index = lines.iter().position(|l| l.trim_start().starts_with('#'));
        let title = title_index.map_or_else(
            || path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
            |i| lines[i].trim_start().trim_start_matches('#').trim().to_owned(),
        );
        let start = title_index.map_or(0, |i| i + 1);
        let mut issue = parse_block(id, title, &lines[start..], ctx);
        issue.source_path = Some(path.to_path_buf());
        return vec![issue];
    }

    headers
        .iter()
        .enumerate()
        .map(|(n, (line_index, id, title))| {
            let end = headers.get(n + 1).map_or(lines.len(), |next| next.0);
            let mut issue = parse_block(*id, title.clone(), &lines[line_index + 1..end], ctx);
            issue.source_path = Some(path.to_path_buf());
            issue
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::issue::IssueState;

    const CRAWLER_FILE: &str = "# Issue #123: Crash when saving large files
- **状态 (State)**: closed
- **创建者 (Author)**: [octo](https://github.com/octo)
- **创建时间 (Created at)**: 2024-05-01 10:00:00
- **Labels**: bug, `ui`
- **GitHub 链接**: [View on GitHub](https://github.com/o/r/issues/123)
---
## 描述 (Description)

The editor crashes.

Steps to reproduce:
1. Open a big file
";

    #[test]
    fn test_parse_crawler_file() {
        let issues = parse_markdown(CRAWLER_FILE, Path::new("issue_123_Crash.md"), &FolderContext::default());
        assert_eq!(issues.len(), 1);
        let issue = &issues[0];
        assert_eq!(issue.id, 123);
        assert_eq!(issue.title, "Crash when saving large files");
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.url, "https://github.com/o/r/issues/123");
        assert_eq!(issue.label_list(), vec!["bug".to_owned(), "ui".to_owned()]);
        assert_eq!(
            issue.created_at.unwrap().to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
        assert!(issue.body.starts_with("The editor crashes."));
        assert!(issue.body.ends_with("1. Open a big file"));
        assert!(!issue.body.contains("描述"));
    }

    #[test]
    fn test_placeholder_body_is_empty() {
        let content = "# Issue #5: No description\n- **状态 (State)**: open\n---\n## 描述 (Description)\n\n此 Issue 没有提供描述。\n";
        let issues = parse_markdown(content, Path::new("x.md"), &FolderContext::default());
        assert!(issues[0].body.is_empty());
    }

    #[test]
    fn test_multiple_issues_in_one_file() {
        let content = "## Issue #1: First\nbody one\n## Issue #2: Second\n- **Labels**: enhancement\nbody two\n";
        let issues = parse_markdown(content, Path::new("issues.md"), &FolderContext::default());
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].body, "body one");
        assert_eq!(issues[1].title, "Second");
        assert_eq!(issues[1].body, "body two");
        assert!(issues[1].labels.contains("enhancement"));
    }

    #[test]
    fn test_id_falls_back_to_filename() {
        let content = "# Some heading\n\nJust text.\n";
        let issues = parse_markdown(content, Path::new("dir/issue_77_some_heading.md"), &FolderContext::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].id, 77);
        assert_eq!(issues[0].title, "Some heading");
        assert_eq!(issues[0].body, "Just text.");
    }

    #[test]
    fn test_file_without_id_yields_nothing() {
        assert!(parse_markdown("# Notes\ntext", Path::new("notes.md"), &FolderContext::default()).is_empty());
    }

    #[test]
    fn test_folder_context_fills_defaults() {
        let ctx = FolderContext {
            state: Some(IssueState::Closed),
            category: Some(Category::Enhancement),
        };
        let issues = parse_markdown("# Issue #9: Title\nbody", Path::new("a.md"), &ctx);
        assert_eq!(issues[0].state, IssueState::Closed);
        assert_eq!(issues[0].folder_category, Some(Category::Enhancement));
    }

    #[test]
    fn test_header_variants() {
        assert_eq!(parse_header("# Issue #12: Title"), Some((12, "Title".to_owned())));
        assert_eq!(parse_header("### #7 - Title"), Some((7, "Title".to_owned())));
        assert_eq!(parse_header("# issue #3："), Some((3, String::new())));
        assert_eq!(parse_header("#### Issue #1: too deep"), None);
        assert_eq!(parse_header("# Issue: no id"), None);
    }
}
