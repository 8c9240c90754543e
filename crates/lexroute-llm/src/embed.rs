//! Embeddings over an OpenAI-compatible `/embeddings` endpoint.
//!
//! Returned vectors are truncated or zero-padded to the configured
//! dimensionality so the index never sees mixed sizes.

use std::time::Duration;

use lexroute_core::capability::{CapabilityError, Embedder};
use serde::{Deserialize, Serialize};

use crate::{build_client, check_status, transport_error};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  /// `hashing` (local, no network) or `http`.
  pub provider:     String,
  pub base_url:     String,
  pub api_key:      Option<String>,
  pub model:        String,
  pub dimensions:   usize,
  pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider:     "hashing".into(),
      base_url:     "http://localhost:11434/v1".into(),
      api_key:      None,
      model:        "nomic-embed-text".into(),
      dimensions:   384,
      timeout_secs: 30,
    }
  }
}

#[derive(Clone)]
pub struct HttpEmbedder {
  client:  reqwest::Client,
  config:  EmbeddingConfig,
  timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
  model: &'a str,
  input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
  data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
  #[serde(default)]
  index:     usize,
  embedding: Vec<f32>,
}

impl HttpEmbedder {
  pub fn new(config: EmbeddingConfig) -> Result<Self, CapabilityError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = build_client(timeout)?;
    Ok(Self { client, config, timeout })
  }
}

impl Embedder for HttpEmbedder {
  fn dimensions(&self) -> usize { self.config.dimensions }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
    let mut req = self
      .client
      .post(url)
      .json(&EmbedRequest { model: &self.config.model, input: texts });
    if let Some(key) = &self.config.api_key {
      req = req.bearer_auth(key);
    }

    let resp = req.send().await.map_err(|e| transport_error(e, self.timeout))?;
    let resp = check_status(resp).await?;
    let mut parsed: EmbedResponse =
      resp.json().await.map_err(|e| transport_error(e, self.timeout))?;

    if parsed.data.len() != texts.len() {
      return Err(CapabilityError::Malformed(format!(
        "expected {} embeddings, got {}",
        texts.len(),
        parsed.data.len()
      )));
    }
    parsed.data.sort_by_key(|d| d.index);

    let dims = self.config.dimensions;
    Ok(
      parsed
        .data
        .into_iter()
        .map(|d| {
          let mut v = d.embedding;
          v.resize(dims, 0.0);
          v
        })
        .collect(),
    )
  }
}
