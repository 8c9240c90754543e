//! Chat transcripts scoped to a single committed report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on a single user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id:         Uuid,
  pub report_id:  Uuid,
  pub role:       ChatRole,
  pub content:    String,
  /// Origins of the passages the answer was grounded on. Empty for user
  /// messages.
  #[serde(default)]
  pub sources:    Vec<String>,
  pub created_at: DateTime<Utc>,
}

impl ChatMessage {
  pub fn user(report_id: Uuid, content: impl Into<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      report_id,
      role: ChatRole::User,
      content: content.into(),
      sources: Vec::new(),
      created_at: Utc::now(),
    }
  }

  pub fn assistant(report_id: Uuid, content: impl Into<String>, sources: Vec<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      report_id,
      role: ChatRole::Assistant,
      content: content.into(),
      sources,
      created_at: Utc::now(),
    }
  }
}

/// Check a user message against the accepted length range.
pub fn message_in_bounds(text: &str) -> bool {
  let n = text.trim().chars().count();
  (1..=MAX_MESSAGE_CHARS).contains(&n)
}
