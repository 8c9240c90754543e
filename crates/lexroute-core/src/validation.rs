//! Validation outcomes attached to a report, one per loop iteration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueCategory {
  Completeness,
  Specificity,
  Consistency,
  Sourcing,
  Relevance,
  Formatting,
  /// A stage failed outright (generation or validation could not complete).
  StageFailure,
  Other,
}

impl IssueCategory {
  /// Lenient mapping from a free-form label to a category.
  pub fn from_label(label: &str) -> Self {
    let l = label.trim().to_ascii_lowercase();
    match l.as_str() {
      s if s.starts_with("complete") || s.contains("missing") => Self::Completeness,
      s if s.starts_with("specific") || s.contains("vague") || s.contains("generic") => {
        Self::Specificity
      }
      s if s.starts_with("consisten") || s.contains("contradict") => Self::Consistency,
      s if s.starts_with("sourc") || s.contains("citation") || s.contains("url") => {
        Self::Sourcing
      }
      s if s.starts_with("relevan") => Self::Relevance,
      s if s.starts_with("format") || s.contains("date") => Self::Formatting,
      "stage_failure" => Self::StageFailure,
      _ => Self::Other,
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
  Minor,
  Major,
  /// Prevents approval regardless of score.
  Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
  pub category:    IssueCategory,
  pub severity:    Severity,
  pub description: String,
}

impl Issue {
  pub fn new(category: IssueCategory, severity: Severity, description: impl Into<String>) -> Self {
    Self { category, severity, description: description.into() }
  }
}

/// Append-only record of one validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
  /// 1-based loop iteration this record belongs to.
  pub iteration:     u32,
  pub is_approved:   bool,
  /// In `0..=100`.
  pub quality_score: u8,
  pub feedback_text: String,
  pub issues:        Vec<Issue>,
  pub validated_at:  DateTime<Utc>,
}

impl ValidationRecord {
  /// Record for an iteration whose generation or validation stage failed
  /// after all retries. It counts as a rejected iteration.
  pub fn stage_failure(iteration: u32, description: impl Into<String>) -> Self {
    let description = description.into();
    Self {
      iteration,
      is_approved: false,
      quality_score: 0,
      feedback_text: description.clone(),
      issues: vec![Issue::new(IssueCategory::StageFailure, Severity::Blocking, description)],
      validated_at: Utc::now(),
    }
  }

  pub fn has_blocking(&self) -> bool {
    self.issues.iter().any(|i| i.severity == Severity::Blocking)
  }
}
