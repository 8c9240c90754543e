//! Text generation over the Anthropic Messages API.

use std::time::Duration;

use lexroute_core::capability::{CapabilityError, CompletionRequest, TextGenerator};
use serde::{Deserialize, Serialize};

use crate::{build_client, check_status, transport_error};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
  pub base_url:     String,
  pub api_key:      String,
  pub model:        String,
  /// Upper bound applied to every request's `max_tokens`.
  pub max_tokens:   u32,
  pub timeout_secs: u64,
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://api.anthropic.com".into(),
      api_key:      String::new(),
      model:        "claude-sonnet-4-20250514".into(),
      max_tokens:   4096,
      timeout_secs: 120,
    }
  }
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct AnthropicClient {
  client:  reqwest::Client,
  config:  LlmConfig,
  timeout: Duration,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model:      &'a str,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  system:     Option<&'a str>,
  messages:   [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
  role:    &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
  #[serde(default)]
  content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  text: String,
}

impl AnthropicClient {
  pub fn new(config: LlmConfig) -> Result<Self, CapabilityError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = build_client(timeout)?;
    Ok(Self { client, config, timeout })
  }

  fn url(&self) -> String {
    format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
  }
}

impl TextGenerator for AnthropicClient {
  async fn complete(&self, request: &CompletionRequest) -> Result<String, CapabilityError> {
    if self.config.api_key.is_empty() {
      return Err(CapabilityError::Unavailable("llm.api_key is not set".into()));
    }

    let body = MessagesRequest {
      model:      &self.config.model,
      max_tokens: request.max_tokens.min(self.config.max_tokens),
      system:     request.system.as_deref(),
      messages:   [Message { role: "user", content: &request.prompt }],
    };

    let resp = self
      .client
      .post(self.url())
      .header("x-api-key", &self.config.api_key)
      .header("anthropic-version", API_VERSION)
      .json(&body)
      .send()
      .await
      .map_err(|e| transport_error(e, self.timeout))?;
    let resp = check_status(resp).await?;

    let parsed: MessagesResponse =
      resp.json().await.map_err(|e| transport_error(e, self.timeout))?;

    let text: String = parsed
      .content
      .into_iter()
      .filter(|b| b.kind == "text")
      .map(|b| b.text)
      .collect();

    if text.trim().is_empty() {
      return Err(CapabilityError::Malformed("completion contained no text".into()));
    }
    tracing::debug!(model = %self.config.model, chars = text.len(), "completion received");
    Ok(text)
  }
}
