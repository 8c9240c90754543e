//! Handlers for `/reports` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/reports/generate` | Body: `{"profile": {...}}` or empty to use the stored profile; 502 if no draft was produced |
//! | `GET`    | `/reports` | `?limit=1..=100&offset=` |
//! | `GET`    | `/reports/search` | `?q=<text>&limit=1..=50` |
//! | `GET`    | `/reports/:id` | 404 if not found |
//! | `DELETE` | `/reports/:id` | Cascades to the index and chat history |
//! | `PUT`    | `/reports/:id/pdf` | Body: `{"pdf_path":"..."}`; 409 while pending |

use axum::{
  Json,
  body::Bytes,
  extract::{Path, Query, State},
  http::StatusCode,
};
use lexroute_core::{
  profile::CompanyProfile,
  report::{Report, ReportPage, ReportStatus, SearchHit},
};
use lexroute_pipeline::Backends;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError, profile};

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 100;
const DEFAULT_HITS: usize = 10;
const MAX_HITS: usize = 50;

fn bounded(value: Option<usize>, default: usize, max: usize, name: &str) -> Result<usize, ApiError> {
  let n = value.unwrap_or(default);
  if !(1..=max).contains(&n) {
    return Err(ApiError::BadRequest(format!("{name} must be between 1 and {max}, got {n}")));
  }
  Ok(n)
}

// ─── Generate ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GenerateBody {
  pub profile: Option<CompanyProfile>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
  pub report_id:       Uuid,
  pub status:          ReportStatus,
  pub iteration_count: u32,
  pub message:         String,
}

/// `POST /reports/generate`
///
/// The pipeline runs on its own task; if the caller disconnects it still
/// commits.
pub async fn generate<B: Backends>(
  State(state): State<ApiState<B>>,
  body: Bytes,
) -> Result<Json<GenerateResponse>, ApiError> {
  let body: GenerateBody = if body.iter().all(u8::is_ascii_whitespace) {
    GenerateBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
  };

  let profile = match body.profile {
    Some(p) => p,
    None => profile::load(&state.profile_path).await?.ok_or_else(|| {
      ApiError::BadRequest("no profile in request and no stored profile".into())
    })?,
  };

  let outcome = state.orchestrator.spawn(profile).await.map_err(ApiError::internal)??;
  Ok(Json(GenerateResponse {
    report_id:       outcome.report_id,
    status:          outcome.status,
    iteration_count: outcome.iteration_count,
    message:         match outcome.status {
      ReportStatus::Approved => "report approved".into(),
      _ => "report did not pass validation; the last draft was kept".into(),
    },
  }))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /reports[?limit=&offset=]`, newest first.
pub async fn list<B: Backends>(
  State(state): State<ApiState<B>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ReportPage>, ApiError> {
  let limit = bounded(params.limit, DEFAULT_PAGE, MAX_PAGE, "limit")?;
  let page = state.repository().list(limit, params.offset.unwrap_or(0)).await?;
  Ok(Json(page))
}

// ─── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
  pub q:     Option<String>,
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
  pub query:   String,
  pub results: Vec<SearchHit>,
  pub total:   usize,
}

/// `GET /reports/search?q=<text>[&limit=]`
pub async fn search<B: Backends>(
  State(state): State<ApiState<B>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
  let query = params.q.unwrap_or_default().trim().to_string();
  if query.is_empty() {
    return Err(ApiError::BadRequest("query parameter `q` is required".into()));
  }
  let limit = bounded(params.limit, DEFAULT_HITS, MAX_HITS, "limit")?;

  let results = state.repository().search(&query, limit).await?;
  Ok(Json(SearchResponse { query, total: results.len(), results }))
}

// ─── Get / delete ─────────────────────────────────────────────────────────────

/// `GET /reports/:id`
pub async fn get_one<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Report>, ApiError> {
  let report = state
    .repository()
    .get(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("report {id} not found")))?;
  Ok(Json(report))
}

/// `DELETE /reports/:id`
pub async fn delete_one<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  if !state.repository().delete(id).await? {
    return Err(ApiError::NotFound(format!("report {id} not found")));
  }
  tracing::info!(report_id = %id, "report deleted");
  Ok(StatusCode::NO_CONTENT)
}

// ─── PDF annotation ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PdfBody {
  pub pdf_path: String,
}

/// `PUT /reports/:id/pdf`
pub async fn annotate_pdf<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<PdfBody>,
) -> Result<Json<Report>, ApiError> {
  if body.pdf_path.trim().is_empty() {
    return Err(ApiError::BadRequest("pdf_path must not be empty".into()));
  }
  let report = state.repository().annotate_pdf(id, body.pdf_path).await?;
  Ok(Json(report))
}
