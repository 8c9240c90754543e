//! The production backend bundle: SQLite storage and HTTP capability clients.

use std::sync::Arc;

use anyhow::Context as _;
use lexroute_core::capability::{CapabilityError, Embedder};
use lexroute_llm::{AnthropicClient, EmbeddingConfig, HttpEmbedder, SearchClient};
use lexroute_pipeline::{Backends, ChatEngine, HashingEmbedder, Orchestrator, ReportRepository};
use lexroute_store_sqlite::{SqliteIndex, SqliteStore};

use crate::config::ServerConfig;

pub struct LiveBackends;

impl Backends for LiveBackends {
  type Store = SqliteStore;
  type Index = SqliteIndex;
  type Search = SearchClient;
  type Llm = AnthropicClient;
  type Embed = EmbedderChoice;
}

/// The embedder selected by `embedding.provider`.
pub enum EmbedderChoice {
  Hashing(HashingEmbedder),
  Http(HttpEmbedder),
}

impl EmbedderChoice {
  pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
    match config.provider.as_str() {
      "hashing" => Ok(Self::Hashing(HashingEmbedder::new(config.dimensions))),
      "http" => Ok(Self::Http(
        HttpEmbedder::new(config.clone()).context("failed to build embedding client")?,
      )),
      other => anyhow::bail!("unknown embedding provider {other:?} (expected hashing or http)"),
    }
  }
}

impl Embedder for EmbedderChoice {
  fn dimensions(&self) -> usize {
    match self {
      Self::Hashing(e) => e.dimensions(),
      Self::Http(e) => e.dimensions(),
    }
  }

  async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CapabilityError> {
    match self {
      Self::Hashing(e) => e.embed(texts).await,
      Self::Http(e) => e.embed(texts).await,
    }
  }
}

/// Long-lived services shared by every request.
pub struct Services {
  pub orchestrator: Orchestrator<LiveBackends>,
  pub chat:         ChatEngine<LiveBackends>,
}

impl Services {
  pub async fn build(config: &ServerConfig) -> anyhow::Result<Self> {
    std::fs::create_dir_all(&config.data_dir)
      .with_context(|| format!("failed to create data dir {:?}", config.data_dir))?;

    let store_path = config.store_path();
    let store = SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open record store at {store_path:?}"))?;
    let index_path = config.index_path();
    let index = SqliteIndex::open(&index_path)
      .await
      .with_context(|| format!("failed to open semantic index at {index_path:?}"))?;

    let llm = Arc::new(
      AnthropicClient::new(config.llm.clone()).context("failed to build text generation client")?,
    );
    let search =
      SearchClient::new(config.search.clone()).context("failed to build web search client")?;
    let embedder = EmbedderChoice::from_config(&config.embedding)?;
    if config.llm.api_key.is_empty() {
      tracing::warn!("no llm.api_key configured; generation and chat will degrade");
    }
    if config.search.base_url.is_none() {
      tracing::warn!("no search.base_url configured; reports will be written without sources");
    }

    let repository =
      ReportRepository::new(Arc::new(store), Arc::new(index), Arc::new(embedder));
    Ok(Self {
      orchestrator: Orchestrator::new(
        repository.clone(),
        Arc::new(search),
        Arc::clone(&llm),
        config.pipeline.clone(),
      ),
      chat:         ChatEngine::new(repository, llm, config.chat.clone()),
    })
  }
}
