//! Completion collaborator: the trait the pipeline talks to, plus an
//! HTTP implementation speaking a messages-style JSON API.

use crate::SkiffError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished on its own
    Ok,
    /// Output was cut at the token limit; content is usable but partial
    Truncated,
    Error,
}

/// One completion exchange result.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: StopReason,
}

/// External text-completion collaborator. Transport, auth, retries, and
/// rate limiting all live behind this seam.
pub trait CompletionProvider: Send + Sync {
    fn send(&self, system: &str, user: &str) -> crate::Result<CompletionResponse>;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Blocking HTTP provider. One request per `send`; no retries.
pub struct HttpProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpProvider {
    pub fn new(api_key: &str) -> Self {
        Self::with_endpoint(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL)
    }

    pub fn with_endpoint(api_key: &str, base_url: &str, model: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl CompletionProvider for HttpProvider {
    fn send(&self, system: &str, user: &str) -> crate::Result<CompletionResponse> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user",
                content: user,
            }],
        };

        let resp = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .map_err(|e| SkiffError::Api(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp
                .json::<ErrorEnvelope>()
                .map(|env| env.error.message)
                .unwrap_or_else(|_| "unparseable error body".to_string());
            return Err(SkiffError::Api(format!("{status}: {message}")));
        }

        let body: MessagesResponse = resp
            .json()
            .map_err(|e| SkiffError::Api(format!("bad response: {e}")))?;

        let content = body
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        let stop_reason = match body.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") | None => StopReason::Ok,
            Some("max_tokens") => StopReason::Truncated,
            Some(_) => StopReason::Error,
        };

        Ok(CompletionResponse {
            content,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_messages_shape() {
        let request = MessagesRequest {
            model: "m",
            max_tokens: 10,
            system: "sys",
            messages: vec![Message {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_response_parses_multi_block_content() {
        let raw = r#"{
            "content": [{"text": "part one. "}, {"text": "part two."}],
            "usage": {"input_tokens": 12, "output_tokens": 7},
            "stop_reason": "end_turn"
        }"#;
        let body: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.content.len(), 2);
        assert_eq!(body.usage.input_tokens, 12);
        assert_eq!(body.stop_reason.as_deref(), Some("end_turn"));
    }
}
