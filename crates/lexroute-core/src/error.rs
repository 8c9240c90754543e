//! Error types for `lexroute-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::report::ReportStatus;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid company profile: {0}")]
  InvalidProfile(String),

  #[error("report {0} is already committed")]
  AlreadyCommitted(Uuid),

  #[error("report {id} is {status}, not committed")]
  NotCommitted { id: Uuid, status: ReportStatus },

  #[error("report {id} expected iteration {expected}, got {got}")]
  IterationOutOfOrder { id: Uuid, expected: u32, got: u32 },

  #[error("report {0} has no validation iterations")]
  NoIterations(Uuid),

  #[error("report {id} violates an invariant: {reason}")]
  Invariant { id: Uuid, reason: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
