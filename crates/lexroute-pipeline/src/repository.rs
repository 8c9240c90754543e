//! Persistence: the dual write to the record store and the semantic index.
//!
//! The record store is authoritative. The index is only used to discover
//! report ids, which are always resolved back through the record store, so an
//! index entry without a record is silently dropped. Index failures after a
//! successful record write are logged and left for [`ReportRepository::repair`].
//!
//! Every write that reads a report before changing it, and every chat turn,
//! holds the report's lock from [`ReportRepository::lock_for`]. A delete
//! therefore never interleaves with a chat append or a PDF annotation.

use std::{
  collections::{HashMap, HashSet},
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::Utc;

use lexroute_core::{
  capability::{CapabilityError, Embedder},
  chat::ChatMessage,
  evidence::SourceDocument,
  report::{Report, ReportPage, ReportStatus, SearchHit, StatusCounts},
  store::{
    ChatStore, EntryKind, IndexEntry, IndexMetadata, IndexQuery, ReportStore, SemanticIndex,
  },
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{boxed, PersistenceError};

type Result<T, E = PersistenceError> = std::result::Result<T, E>;

type ReportLocks = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

pub struct ReportRepository<S, I, E> {
  store:    Arc<S>,
  index:    Arc<I>,
  embedder: Arc<E>,
  locks:    Arc<ReportLocks>,
}

impl<S, I, E> Clone for ReportRepository<S, I, E> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      index:    Arc::clone(&self.index),
      embedder: Arc::clone(&self.embedder),
      locks:    Arc::clone(&self.locks),
    }
  }
}

/// Result of a commit. `indexed == false` means the record is durable but the
/// index has a gap until the next repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
  pub indexed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
  pub reindexed:       usize,
  pub orphans_removed: usize,
  /// Pending reports older than the run budget, deleted.
  pub expired_pending: usize,
  pub failures:        usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
  pub total_reports:    usize,
  pub approved_reports: usize,
  pub failed_reports:   usize,
  pub pending_reports:  usize,
  pub indexed_reports:  usize,
}

/// A retrieved grounding passage.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
  pub kind:      EntryKind,
  /// `report` for report text, the URL for sources.
  pub origin:    String,
  pub text:      String,
  pub relevance: f32,
}

impl<S, I, E> ReportRepository<S, I, E>
where
  S: ReportStore + ChatStore,
  I: SemanticIndex,
  E: Embedder,
{
  pub fn new(store: Arc<S>, index: Arc<I>, embedder: Arc<E>) -> Self {
    Self { store, index, embedder, locks: Arc::default() }
  }

  /// The lock serialising chat turns and read-modify-write updates of one
  /// report. Requests for different reports never contend.
  pub fn lock_for(&self, report_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(report_id).or_default())
  }

  fn release_lock(&self, report_id: Uuid) {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).remove(&report_id);
  }

  // ── Writes ──────────────────────────────────────────────────────────────

  /// Record a report that has just started; it is not indexed.
  pub async fn create_pending(&self, report: &Report) -> Result<()> {
    self.store.upsert_report(report).await.map_err(record_err)
  }

  /// Write a committed report over its pending record, then index it.
  ///
  /// A record-store failure aborts the commit, as does a pending record that
  /// was deleted in the meantime ([`PersistenceError::NotFound`]). An index
  /// failure is logged and reported through [`CommitOutcome::indexed`].
  pub async fn commit(&self, report: &Report) -> Result<CommitOutcome> {
    report.check_invariants()?;
    let lock = self.lock_for(report.id);
    let guard = lock.lock().await;
    if !self.store.replace_report(report).await.map_err(record_err)? {
      return Err(PersistenceError::NotFound(report.id));
    }
    drop(guard);

    match self.index_report(report).await {
      Ok(()) => Ok(CommitOutcome { indexed: true }),
      Err(e) => {
        tracing::warn!(report_id = %report.id, error = %e, "index write failed; left for repair");
        Ok(CommitOutcome { indexed: false })
      }
    }
  }

  /// Remove a report, its chat transcript and its index entries.
  ///
  /// Returns `false` if no record existed. An index failure after the
  /// record is gone leaves orphans that reads filter out.
  pub async fn delete(&self, id: Uuid) -> Result<bool> {
    let lock = self.lock_for(id);
    let guard = lock.lock().await;
    let removed = self.store.delete_report(id).await.map_err(record_err)?;
    self.store.clear_history(id).await.map_err(record_err)?;
    if let Err(e) = self.index.delete_report(id).await {
      tracing::warn!(report_id = %id, error = %e, "index delete failed; orphans filtered on read");
    }
    self.release_lock(id);
    drop(guard);
    Ok(removed)
  }

  /// Record the rendered PDF path on a committed report.
  pub async fn annotate_pdf(&self, id: Uuid, path: String) -> Result<Report> {
    let lock = self.lock_for(id);
    let _guard = lock.lock().await;
    let mut report = self.get(id).await?.ok_or(PersistenceError::NotFound(id))?;
    report.annotate_pdf(path)?;
    if !self.store.replace_report(&report).await.map_err(record_err)? {
      return Err(PersistenceError::NotFound(id));
    }
    Ok(report)
  }

  async fn index_report(&self, report: &Report) -> Result<()> {
    let entries = self.entries_for(report).await?;
    self.index.upsert(&entries).await.map_err(index_err)
  }

  async fn entries_for(&self, report: &Report) -> Result<Vec<IndexEntry>> {
    let metadata = |origin: Option<String>| IndexMetadata {
      company_name: report.company_name.clone(),
      generated_at: report.generated_at,
      status:       report.status,
      overall_risk: report.overall_risk(),
      origin,
    };

    let mut drafts = vec![(report.id.to_string(), EntryKind::Report, report.embeddable_text(), None)];
    let mut seen = HashSet::new();
    for doc in &report.search_metadata.sources {
      let canonical = doc.canonical_url();
      if seen.insert(canonical.clone()) {
        drafts.push((
          source_entry_id(report.id, &canonical),
          EntryKind::Source,
          doc.embeddable_text(),
          Some(doc.url.clone()),
        ));
      }
    }

    let texts: Vec<String> = drafts.iter().map(|(_, _, text, _)| text.clone()).collect();
    let embeddings = self.embedder.embed(&texts).await?;

    Ok(
      drafts
        .into_iter()
        .zip(embeddings)
        .map(|((id, kind, text, origin), embedding)| IndexEntry {
          id,
          report_id: report.id,
          kind,
          text,
          embedding,
          metadata: metadata(origin),
        })
        .collect(),
    )
  }

  // ── Reads ───────────────────────────────────────────────────────────────

  pub async fn get(&self, id: Uuid) -> Result<Option<Report>> {
    self.store.get_report(id).await.map_err(record_err)
  }

  pub async fn list(&self, limit: usize, offset: usize) -> Result<ReportPage> {
    let reports = self.store.list_reports(limit, offset).await.map_err(record_err)?;
    let total = self.store.count_by_status().await.map_err(record_err)?.total();
    Ok(ReportPage { reports, total })
  }

  /// Semantic search over committed reports, most relevant first.
  pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
    if limit == 0 || query.trim().is_empty() {
      return Ok(Vec::new());
    }
    let embedding = self.embed_one(query).await?;
    let hits = self
      .index
      .query(&IndexQuery { embedding, kind: Some(EntryKind::Report), report_id: None, limit })
      .await
      .map_err(index_err)?;

    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
      match self.get(hit.entry.report_id).await? {
        Some(report) => out.push(SearchHit { relevance_score: hit.relevance(), report }),
        None => {
          tracing::debug!(report_id = %hit.entry.report_id, "dropping orphaned index hit");
        }
      }
    }
    Ok(out)
  }

  /// Top passages for `question` scoped to `report`: up to `report_k` from
  /// the report's own text and `source_k` from its sources.
  ///
  /// Falls back to the record itself when the index has no entries for the
  /// report or cannot be queried.
  pub async fn retrieve(
    &self,
    report: &Report,
    question: &str,
    report_k: usize,
    source_k: usize,
  ) -> Result<Vec<Passage>> {
    match self.retrieve_indexed(report.id, question, report_k, source_k).await {
      Ok(passages) if !passages.is_empty() => Ok(passages),
      Ok(_) => Ok(fallback_passages(report, report_k, source_k)),
      Err(e) => {
        tracing::warn!(report_id = %report.id, error = %e, "retrieval failed; using record text");
        Ok(fallback_passages(report, report_k, source_k))
      }
    }
  }

  async fn retrieve_indexed(
    &self,
    report_id: Uuid,
    question: &str,
    report_k: usize,
    source_k: usize,
  ) -> Result<Vec<Passage>> {
    let embedding = self.embed_one(question).await?;
    let mut passages = Vec::new();
    for (kind, limit) in [(EntryKind::Report, report_k), (EntryKind::Source, source_k)] {
      let query = IndexQuery {
        embedding: embedding.clone(),
        kind: Some(kind),
        report_id: Some(report_id),
        limit,
      };
      let hits = self.index.query(&query).await.map_err(index_err)?;
      passages.extend(hits.into_iter().map(|hit| Passage {
        kind,
        relevance: hit.relevance(),
        origin: hit.entry.metadata.origin.clone().unwrap_or_else(|| kind.to_string()),
        text: hit.entry.text,
      }));
    }
    Ok(passages)
  }

  async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
    let mut out = self.embedder.embed(&[text.to_string()]).await?;
    out.pop().ok_or_else(|| {
      PersistenceError::Embedding(CapabilityError::Malformed("embedder returned no vector".into()))
    })
  }

  // ── Chat transcripts ────────────────────────────────────────────────────

  pub async fn history(&self, report_id: Uuid) -> Result<Vec<ChatMessage>> {
    self.store.history(report_id).await.map_err(record_err)
  }

  pub async fn append_messages(&self, messages: &[ChatMessage]) -> Result<()> {
    self.store.append_messages(messages).await.map_err(record_err)
  }

  pub async fn clear_history(&self, report_id: Uuid) -> Result<usize> {
    self.store.clear_history(report_id).await.map_err(record_err)
  }

  // ── Maintenance ─────────────────────────────────────────────────────────

  /// Reconcile the two stores.
  ///
  /// Embeds committed reports that have no report entry, or entries left
  /// behind by an embedder with different dimensions. Drops entries whose
  /// record is gone. Deletes pending reports older than `pending_ttl`, which
  /// belong to runs that died before committing.
  pub async fn repair(&self, pending_ttl: Duration) -> Result<RepairSummary> {
    let mut summary = RepairSummary::default();

    for id in self.store.report_ids(Some(ReportStatus::Pending)).await.map_err(record_err)? {
      let Some(report) = self.get(id).await? else { continue };
      let age = Utc::now().signed_duration_since(report.generated_at);
      if !age.to_std().is_ok_and(|age| age > pending_ttl) {
        continue;
      }
      match self.delete(id).await {
        Ok(_) => summary.expired_pending += 1,
        Err(e) => {
          summary.failures += 1;
          tracing::warn!(report_id = %id, error = %e, "failed to expire pending report");
        }
      }
    }

    let mut committed = self
      .store
      .report_ids(Some(ReportStatus::Approved))
      .await
      .map_err(record_err)?;
    committed.extend(
      self
        .store
        .report_ids(Some(ReportStatus::Failed))
        .await
        .map_err(record_err)?,
    );
    let all: HashSet<Uuid> =
      self.store.report_ids(None).await.map_err(record_err)?.into_iter().collect();

    let mut current: HashSet<Uuid> = self
      .index
      .indexed_report_ids(EntryKind::Report)
      .await
      .map_err(index_err)?
      .into_iter()
      .collect();
    let mut indexed = current.clone();
    indexed.extend(self.index.indexed_report_ids(EntryKind::Source).await.map_err(index_err)?);
    for stale in
      self.index.stale_report_ids(self.embedder.dimensions()).await.map_err(index_err)?
    {
      current.remove(&stale);
    }

    for id in indexed.iter().filter(|id| !all.contains(*id)) {
      match self.index.delete_report(*id).await {
        Ok(_) => summary.orphans_removed += 1,
        Err(e) => {
          summary.failures += 1;
          tracing::warn!(report_id = %id, error = %e, "failed to remove orphaned entries");
        }
      }
    }

    for id in committed.into_iter().filter(|id| !current.contains(id)) {
      let Some(report) = self.get(id).await? else { continue };
      match self.reindex(&report).await {
        Ok(()) => summary.reindexed += 1,
        Err(e) => {
          summary.failures += 1;
          tracing::warn!(report_id = %id, error = %e, "failed to re-index report");
        }
      }
    }

    if summary != RepairSummary::default() {
      tracing::info!(
        reindexed = summary.reindexed,
        orphans_removed = summary.orphans_removed,
        expired_pending = summary.expired_pending,
        failures = summary.failures,
        "stores repaired"
      );
    }
    Ok(summary)
  }

  /// Replace every entry of `report`, so entries of a stale embedding that
  /// the new id set no longer covers do not linger.
  async fn reindex(&self, report: &Report) -> Result<()> {
    let entries = self.entries_for(report).await?;
    self.index.delete_report(report.id).await.map_err(index_err)?;
    self.index.upsert(&entries).await.map_err(index_err)
  }

  pub async fn stats(&self) -> Result<Stats> {
    let StatusCounts { pending, approved, failed } =
      self.store.count_by_status().await.map_err(record_err)?;
    let indexed_reports = self.index.count(Some(EntryKind::Report)).await.map_err(index_err)?;
    Ok(Stats {
      total_reports: pending + approved + failed,
      approved_reports: approved,
      failed_reports: failed,
      pending_reports: pending,
      indexed_reports,
    })
  }
}

/// Index id for one of a report's source documents, stable across re-commits.
pub fn source_entry_id(report_id: Uuid, canonical_url: &str) -> String {
  let digest = Sha256::digest(canonical_url.as_bytes());
  format!("{report_id}:src:{}", &hex::encode(digest)[..16])
}

fn fallback_passages(report: &Report, report_k: usize, source_k: usize) -> Vec<Passage> {
  let mut out = Vec::new();
  if report_k > 0 {
    out.push(Passage {
      kind:      EntryKind::Report,
      origin:    EntryKind::Report.to_string(),
      text:      report.embeddable_text(),
      relevance: 0.0,
    });
  }
  out.extend(report.search_metadata.sources.iter().take(source_k).map(|d: &SourceDocument| {
    Passage {
      kind:      EntryKind::Source,
      origin:    d.url.clone(),
      text:      d.embeddable_text(),
      relevance: 0.0,
    }
  }));
  out
}

fn record_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> PersistenceError {
  PersistenceError::RecordStore(boxed(e))
}

fn index_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> PersistenceError {
  PersistenceError::Index(boxed(e))
}
