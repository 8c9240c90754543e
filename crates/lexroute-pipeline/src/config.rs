//! Tunables for the pipeline services. Every field has a default so an empty
//! configuration file yields a working pipeline.

use std::time::Duration;

use serde::Deserialize;

/// Which draft a report keeps when no iteration was approved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
  /// The last draft produced.
  #[default]
  MostRecent,
  /// The draft with the highest quality score; later drafts win ties.
  HighestScoring,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Upper bound on generate/validate iterations per report.
  pub max_iterations:     u32,
  /// Minimum quality score for approval.
  pub approval_threshold: u8,
  /// Attempts per stage within one iteration (1 = no retry).
  pub attempts_per_stage: u32,
  pub stage_timeout_secs: u64,
  pub max_tokens:         u32,
  pub retention:          RetentionPolicy,
  pub gateway:            GatewayConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      max_iterations:     3,
      approval_threshold: 75,
      attempts_per_stage: 2,
      stage_timeout_secs: 180,
      max_tokens:         4096,
      retention:          RetentionPolicy::default(),
      gateway:            GatewayConfig::default(),
    }
  }
}

impl PipelineConfig {
  pub fn stage_timeout(&self) -> Duration { Duration::from_secs(self.stage_timeout_secs) }

  /// `max_iterations` and `attempts_per_stage` are clamped to at least one.
  pub fn normalized(mut self) -> Self {
    self.max_iterations = self.max_iterations.max(1);
    self.attempts_per_stage = self.attempts_per_stage.max(1);
    self.approval_threshold = self.approval_threshold.min(100);
    self
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
  pub max_queries:       usize,
  pub results_per_query: usize,
  pub max_documents:     usize,
  pub timeout_secs:      u64,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self { max_queries: 8, results_per_query: 5, max_documents: 15, timeout_secs: 30 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
  pub report_passages: usize,
  pub source_passages: usize,
  /// Number of most recent messages included as conversation context.
  pub history_window:  usize,
  pub max_tokens:      u32,
  pub timeout_secs:    u64,
}

impl Default for ChatConfig {
  fn default() -> Self {
    Self {
      report_passages: 3,
      source_passages: 5,
      history_window:  6,
      max_tokens:      1024,
      timeout_secs:    60,
    }
  }
}
