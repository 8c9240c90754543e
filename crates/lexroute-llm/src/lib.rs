//! HTTP clients for the external capabilities lexroute consumes.
//!
//! - [`AnthropicClient`]: text generation over the Anthropic Messages API.
//! - [`SearchClient`]: web search over a small JSON search service.
//! - [`HttpEmbedder`]: embeddings over an OpenAI-compatible `/embeddings`
//!   endpoint.
//!
//! Every client carries its own per-request timeout; exceeding it surfaces as
//! [`CapabilityError::Timeout`].

mod anthropic;
mod embed;
mod search;

use std::time::Duration;

use lexroute_core::capability::CapabilityError;

pub use anthropic::{AnthropicClient, LlmConfig};
pub use embed::{EmbeddingConfig, HttpEmbedder};
pub use search::{SearchClient, SearchConfig};

fn build_client(timeout: Duration) -> Result<reqwest::Client, CapabilityError> {
  reqwest::Client::builder()
    .timeout(timeout)
    .build()
    .map_err(|e| CapabilityError::Transport(format!("failed to build HTTP client: {e}")))
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> CapabilityError {
  if e.is_timeout() {
    CapabilityError::Timeout(timeout)
  } else if e.is_decode() {
    CapabilityError::Malformed(e.to_string())
  } else {
    CapabilityError::Transport(e.to_string())
  }
}

/// Turn a non-success response into [`CapabilityError::Rejected`].
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, CapabilityError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  Err(CapabilityError::Rejected { status: status.as_u16(), body })
}
