//! Runtime configuration, read from an optional TOML file layered under
//! `LEXROUTE_*` environment variables (`__` separates nested keys, e.g.
//! `LEXROUTE_LLM__API_KEY`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use lexroute_llm::{EmbeddingConfig, LlmConfig, SearchConfig};
use lexroute_pipeline::{ChatConfig, PipelineConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  /// Base directory for every file below that is not set explicitly.
  pub data_dir:             PathBuf,
  pub store_path:           Option<PathBuf>,
  pub index_path:           Option<PathBuf>,
  pub profile_path:         Option<PathBuf>,
  /// Seconds between background repairs; 0 disables them.
  pub repair_interval_secs: u64,
  pub llm:                  LlmConfig,
  pub search:               SearchConfig,
  pub embedding:            EmbeddingConfig,
  pub pipeline:             PipelineConfig,
  pub chat:                 ChatConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".into(),
      port:                 8000,
      data_dir:             PathBuf::from("data"),
      store_path:           None,
      index_path:           None,
      profile_path:         None,
      repair_interval_secs: 3600,
      llm:                  LlmConfig::default(),
      search:               SearchConfig::default(),
      embedding:            EmbeddingConfig::default(),
      pipeline:             PipelineConfig::default(),
      chat:                 ChatConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Load `path` (if it exists) and apply environment overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("LEXROUTE")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .with_context(|| format!("failed to read config from {path:?}"))?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_path(&self) -> PathBuf {
    self.resolve(self.store_path.as_deref(), "reports.db")
  }

  pub fn index_path(&self) -> PathBuf {
    self.resolve(self.index_path.as_deref(), "index.db")
  }

  pub fn profile_path(&self) -> PathBuf {
    self.resolve(self.profile_path.as_deref(), "company_profile.json")
  }

  fn resolve(&self, explicit: Option<&Path>, file: &str) -> PathBuf {
    let path = explicit.map_or_else(|| self.data_dir.join(file), Path::to_path_buf);
    expand_tilde(&path)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
