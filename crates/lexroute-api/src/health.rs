//! Liveness and summary counters.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use lexroute_pipeline::{Backends, repository::Stats};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
  pub status:    String,
  pub timestamp: DateTime<Utc>,
}

/// `GET /health`
pub async fn health() -> Json<Health> {
  Json(Health { status: "ok".into(), timestamp: Utc::now() })
}

/// `GET /stats`
pub async fn stats<B: Backends>(State(state): State<ApiState<B>>) -> Result<Json<Stats>, ApiError> {
  Ok(Json(state.repository().stats().await?))
}
