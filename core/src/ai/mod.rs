pub mod claude;
pub mod http;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use claude::ClaudeCliJudge;
pub use http::ChatCompletionsJudge;

// ---------------------------------------------------------------------------
// Shared AI response parsing helpers
// ---------------------------------------------------------------------------

/// Extract the JSON object from an LLM reply, handling markdown fences
/// and surrounding prose. Returns `None` when the reply holds no object.
pub(crate) fn extract_json_str(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_marker = &trimmed[start + 7..];
        if let Some(end) = after_marker.find("```") {
            return Some(after_marker[..end].trim());
        }
        return Some(after_marker.trim());
    }

    if let Some(start) = trimmed.find("```") {
        let after_marker = &trimmed[start + 3..];
        let after_newline = after_marker
            .find('\n')
            .map_or(after_marker, |i| &after_marker[i + 1..]);
        let fenced = after_newline
            .find("```")
            .map_or(after_newline, |end| &after_newline[..end])
            .trim();
        if fenced.starts_with('{') {
            return Some(fenced);
        }
    }

    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// First `max` characters of `s`, for error messages and logs.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JudgeError {
    #[error("Rate limited by LLM provider")]
    RateLimited { retry_after: Option<Duration> },
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
    #[error("LLM transport error: {0}")]
    Transport(String),
    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Empty response from LLM")]
    EmptyResponse,
    #[error("Claude CLI not found. Install from https://claude.ai/code")]
    ClaudeNotFound,
    #[error("LLM command failed: {0}")]
    CommandFailed(String),
}

impl JudgeError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Transport(_)
            | Self::EmptyResponse
            | Self::CommandFailed(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::ClaudeNotFound => false,
        }
    }

    /// Server-requested delay before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// The external LLM that judges issue suitability.
///
/// A request is one self-contained prompt; the reply is raw text that the
/// caller parses.
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, prompt: &str) -> Result<String, JudgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_markdown_fence() {
        let output = "Here you go:\n```json\n{\"suitable\": true}\n```\nDone.";
        assert_eq!(extract_json_str(output), Some("{\"suitable\": true}"));
    }

    #[test]
    fn test_extract_json_from_bare_fence() {
        let output = "```\n{\"suitable\": false}\n```";
        assert_eq!(extract_json_str(output), Some("{\"suitable\": false}"));
    }

    #[test]
    fn test_extract_json_surrounded_by_prose() {
        let output = "Analysis... {\"suitable\": true, \"reason\": \"ok\"} thanks";
        assert_eq!(
            extract_json_str(output),
            Some("{\"suitable\": true, \"reason\": \"ok\"}")
        );
    }

    #[test]
    fn test_extract_json_none_without_object() {
        assert_eq!(extract_json_str("SUITABLE: true - fine"), None);
        assert_eq!(extract_json_str("} backwards {"), None);
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("崩溃了吗", 2), "崩溃");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(JudgeError::RateLimited { retry_after: None }.is_retryable());
        assert!(JudgeError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!JudgeError::Api { status: 401, body: String::new() }.is_retryable());
        assert!(!JudgeError::ClaudeNotFound.is_retryable());
    }
}
