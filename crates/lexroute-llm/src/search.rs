//! Web search over a JSON search service.
//!
//! Wire contract: `POST {base_url}/search {query, max_results, region}` with
//! an optional bearer key, answered by `{results: [{url, title, snippet,
//! published_date?}]}`.

use std::time::Duration;

use lexroute_core::capability::{CapabilityError, SearchResult, WebSearch};
use serde::{Deserialize, Serialize};

use crate::{build_client, check_status, transport_error};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  /// When unset, every search fails with `Unavailable` and reports are
  /// generated without evidence.
  pub base_url:     Option<String>,
  pub api_key:      Option<String>,
  pub region:       String,
  pub timeout_secs: u64,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self { base_url: None, api_key: None, region: "eu".into(), timeout_secs: 30 }
  }
}

#[derive(Clone)]
pub struct SearchClient {
  client:  reqwest::Client,
  config:  SearchConfig,
  timeout: Duration,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
  query:       &'a str,
  max_results: usize,
  region:      &'a str,
}

#[derive(Deserialize)]
struct SearchResponse {
  #[serde(default)]
  results: Vec<SearchResult>,
}

impl SearchClient {
  pub fn new(config: SearchConfig) -> Result<Self, CapabilityError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let client = build_client(timeout)?;
    Ok(Self { client, config, timeout })
  }
}

impl WebSearch for SearchClient {
  async fn search(
    &self,
    query: &str,
    max_results: usize,
  ) -> Result<Vec<SearchResult>, CapabilityError> {
    let Some(base) = self.config.base_url.as_deref() else {
      return Err(CapabilityError::Unavailable("search.base_url is not set".into()));
    };
    let url = format!("{}/search", base.trim_end_matches('/'));

    let mut req = self.client.post(url).json(&SearchRequest {
      query,
      max_results,
      region: &self.config.region,
    });
    if let Some(key) = &self.config.api_key {
      req = req.bearer_auth(key);
    }

    let resp = req.send().await.map_err(|e| transport_error(e, self.timeout))?;
    let resp = check_status(resp).await?;
    let parsed: SearchResponse =
      resp.json().await.map_err(|e| transport_error(e, self.timeout))?;

    let mut results = parsed.results;
    results.truncate(max_results);
    tracing::debug!(query, count = results.len(), "search completed");
    Ok(results)
  }
}
