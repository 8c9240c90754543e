//! Storage traits: the authoritative record store, chat transcripts and the
//! semantic index.
//!
//! Backends live in `lexroute-store-sqlite`. The pipeline depends on these
//! abstractions only.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  chat::ChatMessage,
  draft::RiskLevel,
  report::{Report, ReportStatus, StatusCounts},
};

// ─── Record store ────────────────────────────────────────────────────────────

/// Keyed, authoritative storage for [`Report`] aggregates.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert or overwrite the report with `report.id`.
  fn upsert_report<'a>(
    &'a self,
    report: &'a Report,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Overwrite an existing report. Returns `false`, writing nothing, if no
  /// report with `report.id` exists.
  fn replace_report<'a>(
    &'a self,
    report: &'a Report,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn get_report(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Report>, Self::Error>> + Send + '_;

  /// Reports ordered newest first.
  fn list_reports(
    &self,
    limit: usize,
    offset: usize,
  ) -> impl Future<Output = Result<Vec<Report>, Self::Error>> + Send + '_;

  /// Returns `true` if a report was removed.
  fn delete_report(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Ids of every stored report, optionally restricted to one status.
  fn report_ids(
    &self,
    status: Option<ReportStatus>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  fn count_by_status(
    &self,
  ) -> impl Future<Output = Result<StatusCounts, Self::Error>> + Send + '_;
}

// ─── Chat transcripts ────────────────────────────────────────────────────────

/// Append-only chat transcripts, one per report id.
pub trait ChatStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append messages in order. Either all are stored or none.
  fn append_messages<'a>(
    &'a self,
    messages: &'a [ChatMessage],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Full transcript in append order.
  fn history(
    &self,
    report_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ChatMessage>, Self::Error>> + Send + '_;

  /// Returns the number of messages removed.
  fn clear_history(
    &self,
    report_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Semantic index ──────────────────────────────────────────────────────────

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
pub enum EntryKind {
  /// The report's own summary and section text.
  Report,
  /// A source document the report was generated from.
  Source,
}

/// Searchable metadata carried by every index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
  pub company_name: String,
  pub generated_at: chrono::DateTime<chrono::Utc>,
  pub status:       ReportStatus,
  pub overall_risk: Option<RiskLevel>,
  /// Source URL or title for `Source` entries.
  pub origin:       Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
  /// Unique within the index; upserts are keyed on it.
  pub id:        String,
  pub report_id: Uuid,
  pub kind:      EntryKind,
  pub text:      String,
  pub embedding: Vec<f32>,
  pub metadata:  IndexMetadata,
}

/// Parameters for [`SemanticIndex::query`].
#[derive(Debug, Clone, Default)]
pub struct IndexQuery {
  pub embedding: Vec<f32>,
  pub kind:      Option<EntryKind>,
  /// Restrict hits to entries of one report.
  pub report_id: Option<Uuid>,
  pub limit:     usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
  pub entry:    IndexEntry,
  /// Cosine distance in `[0, 2]`; lower is closer.
  pub distance: f32,
}

impl IndexHit {
  pub fn relevance(&self) -> f32 { 1.0 - self.distance }
}

/// Embedding-backed discovery index. Never authoritative for report content.
pub trait SemanticIndex: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn upsert<'a>(
    &'a self,
    entries: &'a [IndexEntry],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Nearest entries to `query.embedding`, closest first.
  fn query<'a>(
    &'a self,
    query: &'a IndexQuery,
  ) -> impl Future<Output = Result<Vec<IndexHit>, Self::Error>> + Send + 'a;

  /// Remove every entry tagged with `report_id`. Returns the number removed.
  fn delete_report(
    &self,
    report_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Distinct report ids with an entry of `kind` in the index.
  fn indexed_report_ids(
    &self,
    kind: EntryKind,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Distinct report ids with at least one entry whose embedding does not
  /// have `dimensions` components.
  fn stale_report_ids(
    &self,
    dimensions: usize,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  fn count(
    &self,
    kind: Option<EntryKind>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

/// Cosine distance `1 - cos(a, b)`. Zero vectors and mismatched lengths are
/// maximally distant from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 2.0;
  }
  let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    na += x * x;
    nb += y * y;
  }
  if na == 0.0 || nb == 0.0 {
    return 2.0;
  }
  (1.0 - dot / (na.sqrt() * nb.sqrt())).clamp(0.0, 2.0)
}
