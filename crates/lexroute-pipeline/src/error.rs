//! Error types for the pipeline services.
//!
//! Stage-local failures (`GenerationError`, `ValidationError`) are absorbed by
//! the orchestrator and turned into report state. Only `PipelineError` and
//! `ChatError` reach callers.

use lexroute_core::{capability::CapabilityError, report::ReportStatus};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors are boxed at the pipeline seam so services stay generic
/// over the backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) fn boxed<E: std::error::Error + Send + Sync + 'static>(e: E) -> BoxError {
  Box::new(e)
}

#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("text generation failed: {0}")]
  Capability(#[from] CapabilityError),

  #[error("reply is not a valid report draft: {0}")]
  Parse(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
  #[error("validation call failed: {0}")]
  Capability(#[from] CapabilityError),

  #[error("reply is not a valid verdict: {0}")]
  Parse(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("record store error: {0}")]
  RecordStore(BoxError),

  #[error("semantic index error: {0}")]
  Index(BoxError),

  #[error("embedding failed: {0}")]
  Embedding(#[from] CapabilityError),

  #[error("report not found: {0}")]
  NotFound(Uuid),

  #[error(transparent)]
  Core(#[from] lexroute_core::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Core(#[from] lexroute_core::Error),

  #[error("failed to persist report: {0}")]
  Persistence(#[from] PersistenceError),

  /// Every iteration failed to produce a draft. Nothing is stored under
  /// `report_id`.
  #[error("report {report_id}: no draft produced in {iterations} iterations")]
  GenerationExhausted { report_id: Uuid, iterations: u32 },
}

#[derive(Debug, Error)]
pub enum ChatError {
  #[error("report not found: {0}")]
  NotFound(Uuid),

  #[error("report {id} is {status}; chat needs a committed report")]
  NotReady { id: Uuid, status: ReportStatus },

  #[error("invalid message: {0}")]
  InvalidMessage(String),

  #[error(transparent)]
  Persistence(#[from] PersistenceError),
}
