//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use lexroute_pipeline::{ChatError, PersistenceError, PipelineError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  /// The resource exists but is not in a state that allows the request.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The language model never produced a usable reply.
  #[error("upstream failure: {0}")]
  Upstream(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub(crate) fn internal<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Internal(Box::new(e))
  }
}

impl From<PersistenceError> for ApiError {
  fn from(e: PersistenceError) -> Self {
    match e {
      PersistenceError::NotFound(id) => Self::NotFound(format!("report {id} not found")),
      PersistenceError::Core(lexroute_core::Error::NotCommitted { id, status }) => {
        Self::Conflict(format!("report {id} is {status}"))
      }
      other => Self::internal(other),
    }
  }
}

impl From<ChatError> for ApiError {
  fn from(e: ChatError) -> Self {
    match e {
      ChatError::NotFound(id) => Self::NotFound(format!("report {id} not found")),
      e @ ChatError::NotReady { .. } => Self::Conflict(e.to_string()),
      ChatError::InvalidMessage(m) => Self::BadRequest(m),
      ChatError::Persistence(e) => e.into(),
    }
  }
}

impl From<PipelineError> for ApiError {
  fn from(e: PipelineError) -> Self {
    match e {
      PipelineError::Core(e @ lexroute_core::Error::InvalidProfile(_)) => {
        Self::BadRequest(e.to_string())
      }
      PipelineError::Persistence(e) => e.into(),
      e @ PipelineError::GenerationExhausted { .. } => Self::Upstream(e.to_string()),
      other => Self::internal(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Upstream(m) => {
        tracing::warn!(error = %m, "upstream failure");
        (StatusCode::BAD_GATEWAY, m.clone())
      }
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
