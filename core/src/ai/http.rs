//! OpenAI-compatible chat-completions judge.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{truncate_chars, Judge, JudgeError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Sends each prompt as a single user message to
/// `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatCompletionsJudge {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsJudge {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, JudgeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> JudgeError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return JudgeError::RateLimited {
            retry_after: parse_retry_after(headers),
        };
    }
    JudgeError::Api {
        status: status.as_u16(),
        body: truncate_chars(body, 500).to_owned(),
    }
}

/// Pull the assistant text out of a chat-completions response body.
/// Content may be a plain string or an array of typed parts.
fn extract_content(body: &str) -> Result<String, JudgeError> {
    let raw: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        JudgeError::Transport(format!(
            "Failed to parse JSON response: {e} (body: {})",
            truncate_chars(body, 200)
        ))
    })?;

    let content_value = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"));

    let content = match content_value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(parts)) => parts
            .iter()
            .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };

    if content.trim().is_empty() {
        return Err(JudgeError::EmptyResponse);
    }
    Ok(content)
}

#[async_trait]
impl Judge for ChatCompletionsJudge {
    fn name(&self) -> &str {
        &self.model
    }

    async fn judge(&self, prompt: &str) -> Result<String, JudgeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
            temperature: 0.1,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(self.timeout)
                } else {
                    JudgeError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                JudgeError::Timeout(self.timeout)
            } else {
                JudgeError::Transport(format!("Failed to read response body: {e}"))
            }
        })?;

        if !status.is_success() {
            log::debug!("[ai] {} returned {status}", self.endpoint());
            return Err(status_error(status, &headers, &body));
        }

        extract_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_extract_string_content() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "SUITABLE: true - ok"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "SUITABLE: true - ok");
    }

    #[test]
    fn test_extract_content_parts() {
        let body = r#"{"choices": [{"message": {"content": [
            {"type": "text", "text": "{\"suitable\": "},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "false}"}
        ]}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "{\"suitable\": false}");
    }

    #[test]
    fn test_missing_content_is_empty_response() {
        assert_eq!(
            extract_content(r#"{"choices": []}"#),
            Err(JudgeError::EmptyResponse)
        );
    }

    #[test]
    fn test_non_json_body_is_transport_error() {
        assert!(matches!(
            extract_content("<html>bad gateway</html>"),
            Err(JudgeError::Transport(_))
        ));
    }

    #[test]
    fn test_429_maps_to_rate_limited_with_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, &headers, ""),
            JudgeError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn test_http_date_retry_after_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_status_errors_keep_retryability() {
        let headers = HeaderMap::new();
        assert!(status_error(StatusCode::BAD_GATEWAY, &headers, "oops").is_retryable());
        assert!(!status_error(StatusCode::UNAUTHORIZED, &headers, "denied").is_retryable());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let judge =
            ChatCompletionsJudge::new("https://api.example.com/v1/", "k", "m", Duration::from_secs(1)).unwrap();
        assert_eq!(judge.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
