//! The company profile, kept as a single JSON document on disk.

use std::{io, path::Path};

use axum::{Json, extract::State};
use lexroute_core::profile::CompanyProfile;
use lexroute_pipeline::Backends;

use crate::{ApiState, error::ApiError};

/// Read the stored profile, `None` if none has been saved yet.
pub async fn load(path: &Path) -> Result<Option<CompanyProfile>, ApiError> {
  let bytes = match tokio::fs::read(path).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(ApiError::internal(e)),
  };
  serde_json::from_slice(&bytes).map(Some).map_err(ApiError::internal)
}

async fn save(path: &Path, profile: &CompanyProfile) -> Result<(), ApiError> {
  if let Some(dir) = path.parent()
    && !dir.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(dir).await.map_err(ApiError::internal)?;
  }
  let json = serde_json::to_vec_pretty(profile).map_err(ApiError::internal)?;
  // Write-then-rename so a reader never sees a half-written file.
  let tmp = path.with_extension("json.tmp");
  tokio::fs::write(&tmp, json).await.map_err(ApiError::internal)?;
  tokio::fs::rename(&tmp, path).await.map_err(ApiError::internal)
}

/// `GET /profile`
pub async fn get_profile<B: Backends>(
  State(state): State<ApiState<B>>,
) -> Result<Json<CompanyProfile>, ApiError> {
  load(&state.profile_path)
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound("no company profile has been saved".into()))
}

/// `PUT /profile`
pub async fn put_profile<B: Backends>(
  State(state): State<ApiState<B>>,
  Json(profile): Json<CompanyProfile>,
) -> Result<Json<CompanyProfile>, ApiError> {
  profile.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
  save(&state.profile_path, &profile).await?;
  tracing::info!(company = %profile.company_name, "company profile saved");
  Ok(Json(profile))
}
