//! Traits for the external capabilities the pipeline consumes: text
//! generation, web search and embeddings.
//!
//! Concrete HTTP clients live in `lexroute-llm`. Pipeline services receive
//! handles to these traits through their constructors so tests can swap in
//! deterministic fakes.

use std::{future::Future, time::Duration};

use thiserror::Error;

/// Failure of a single call to an external capability.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
  #[error("capability is not configured: {0}")]
  Unavailable(String),

  #[error("call timed out after {0:?}")]
  Timeout(Duration),

  #[error("request rejected with status {status}: {body}")]
  Rejected { status: u16, body: String },

  #[error("malformed response: {0}")]
  Malformed(String),

  #[error("transport error: {0}")]
  Transport(String),
}

// ─── Text generation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
  pub system:     Option<String>,
  pub prompt:     String,
  pub max_tokens: u32,
}

impl CompletionRequest {
  pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
    Self { system: Some(system.into()), prompt: prompt.into(), max_tokens: 4096 }
  }

  pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
    self.max_tokens = max_tokens;
    self
  }
}

pub trait TextGenerator: Send + Sync {
  /// Run one completion and return the raw text of the reply.
  fn complete<'a>(
    &'a self,
    request: &'a CompletionRequest,
  ) -> impl Future<Output = Result<String, CapabilityError>> + Send + 'a;
}

// ─── Web search ──────────────────────────────────────────────────────────────

/// One raw result from the search backend, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SearchResult {
  pub url:            String,
  #[serde(default)]
  pub title:          String,
  #[serde(default)]
  pub snippet:        String,
  #[serde(default)]
  pub published_date: Option<String>,
}

pub trait WebSearch: Send + Sync {
  fn search<'a>(
    &'a self,
    query: &'a str,
    max_results: usize,
  ) -> impl Future<Output = Result<Vec<SearchResult>, CapabilityError>> + Send + 'a;
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

pub trait Embedder: Send + Sync {
  /// Dimensionality of every vector this embedder returns.
  fn dimensions(&self) -> usize;

  /// Embed each input text; the output has the same length and order.
  fn embed<'a>(
    &'a self,
    texts: &'a [String],
  ) -> impl Future<Output = Result<Vec<Vec<f32>>, CapabilityError>> + Send + 'a;
}
