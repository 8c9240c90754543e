//! The `Report` aggregate and its lifecycle.
//!
//! A report is created `Pending` when a pipeline run starts. It accumulates
//! one [`ValidationRecord`] per loop iteration and transitions exactly once to
//! `Approved` or `Failed`. After that it is immutable except for the PDF path
//! annotation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  draft::{ReportDraft, RiskLevel},
  evidence::SearchMetadata,
  validation::ValidationRecord,
  Error, Result,
};

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
pub enum ReportStatus {
  Pending,
  Approved,
  Failed,
}

impl ReportStatus {
  /// `Approved` and `Failed` are terminal; a report in either is committed.
  pub fn is_committed(self) -> bool { !matches!(self, Self::Pending) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
  pub id:                 Uuid,
  pub company_name:       String,
  pub status:             ReportStatus,
  pub current_draft:      Option<ReportDraft>,
  pub validation_history: Vec<ValidationRecord>,
  pub iteration_count:    u32,
  pub search_metadata:    SearchMetadata,
  pub generated_at:       DateTime<Utc>,
  #[serde(default)]
  pub pdf_path:           Option<String>,
}

impl Report {
  /// A fresh pending report with a new identity.
  pub fn pending(company_name: impl Into<String>) -> Self {
    Self {
      id:                 Uuid::new_v4(),
      company_name:       company_name.into(),
      status:             ReportStatus::Pending,
      current_draft:      None,
      validation_history: Vec::new(),
      iteration_count:    0,
      search_metadata:    SearchMetadata::default(),
      generated_at:       Utc::now(),
      pdf_path:           None,
    }
  }

  /// Append the outcome of the next loop iteration.
  pub fn record_iteration(&mut self, record: ValidationRecord) -> Result<()> {
    if self.status.is_committed() {
      return Err(Error::AlreadyCommitted(self.id));
    }
    let expected = self.iteration_count + 1;
    if record.iteration != expected {
      return Err(Error::IterationOutOfOrder {
        id: self.id,
        expected,
        got: record.iteration,
      });
    }
    self.validation_history.push(record);
    self.iteration_count = expected;
    Ok(())
  }

  /// Move to the terminal status implied by the last validation record and
  /// retain `draft` as the report content.
  pub fn finish(&mut self, draft: Option<ReportDraft>) -> Result<ReportStatus> {
    if self.status.is_committed() {
      return Err(Error::AlreadyCommitted(self.id));
    }
    let last = self
      .validation_history
      .last()
      .ok_or(Error::NoIterations(self.id))?;
    self.status = if last.is_approved {
      ReportStatus::Approved
    } else {
      ReportStatus::Failed
    };
    self.current_draft = draft;
    self.generated_at = Utc::now();
    Ok(self.status)
  }

  /// Check the committed-report invariants: history length equals the
  /// iteration count and the last record agrees with the status.
  pub fn check_invariants(&self) -> Result<()> {
    let fail = |reason: &str| Error::Invariant { id: self.id, reason: reason.into() };
    if self.validation_history.len() != self.iteration_count as usize {
      return Err(fail("validation history length differs from iteration count"));
    }
    let ordered = self
      .validation_history
      .iter()
      .enumerate()
      .all(|(i, r)| r.iteration as usize == i + 1);
    if !ordered {
      return Err(fail("validation history is not sequential"));
    }
    match self.status {
      ReportStatus::Pending => Ok(()),
      status => {
        let last = self
          .validation_history
          .last()
          .ok_or_else(|| fail("committed report has no validation history"))?;
        if last.is_approved != (status == ReportStatus::Approved) {
          return Err(fail("last validation record disagrees with status"));
        }
        Ok(())
      }
    }
  }

  /// Record where the rendered PDF lives. Only committed reports accept it.
  pub fn annotate_pdf(&mut self, path: impl Into<String>) -> Result<()> {
    if !self.status.is_committed() {
      return Err(Error::NotCommitted { id: self.id, status: self.status });
    }
    self.pdf_path = Some(path.into());
    Ok(())
  }

  pub fn overall_risk(&self) -> Option<RiskLevel> {
    self.current_draft.as_ref().map(|d| d.summary.overall_risk)
  }

  pub fn key_takeaways(&self) -> &[String] {
    self
      .current_draft
      .as_ref()
      .map(|d| d.summary.key_takeaways.as_slice())
      .unwrap_or_default()
  }

  pub fn last_score(&self) -> Option<u8> {
    self.validation_history.last().map(|r| r.quality_score)
  }

  /// Text stored in the semantic index for this report.
  pub fn embeddable_text(&self) -> String {
    match &self.current_draft {
      Some(draft) => draft.embeddable_text(&self.company_name),
      None => format!(
        "Compliance report for {}. No draft could be generated.",
        self.company_name
      ),
    }
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A report resolved from a semantic-index hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
  pub report:          Report,
  /// `1 - cosine distance`; higher is more relevant.
  pub relevance_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPage {
  pub reports: Vec<Report>,
  pub total:   usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
  pub pending:  usize,
  pub approved: usize,
  pub failed:   usize,
}

impl StatusCounts {
  pub fn total(&self) -> usize { self.pending + self.approved + self.failed }
}
