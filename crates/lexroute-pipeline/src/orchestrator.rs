//! The pipeline orchestrator: one evidence fetch, then a bounded
//! generate/validate loop, then the commit.
//!
//! ```text
//! Pending ─▶ (Generating ─▶ Validating)×{1..N} ─▶ Approved | Failed
//! ```
//!
//! Stage failures never abort the run. A generation or validation stage that
//! still fails after its retries consumes the iteration and is recorded as a
//! rejected [`ValidationRecord`]. Only infrastructure failures (the record
//! store) and runs that never produced a draft are raised; either way the
//! pending record is removed.

use std::{sync::Arc, time::Duration};

use lexroute_core::{
  draft::ReportDraft,
  profile::CompanyProfile,
  report::{Report, ReportStatus},
  validation::ValidationRecord,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
  backends::{Backends, Repository},
  config::{PipelineConfig, RetentionPolicy},
  error::{PersistenceError, PipelineError},
  gateway::EvidenceGateway,
  generation::GenerationService,
  repository::RepairSummary,
  retry::with_retry,
  validation::ValidationService,
};

/// Observable position of a run in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Pending,
  Generating { iteration: u32 },
  Validating { iteration: u32 },
  Approved,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationOutcome {
  pub report_id:       Uuid,
  pub status:          ReportStatus,
  pub iteration_count: u32,
  /// Whether the semantic index write succeeded.
  pub indexed:         bool,
}

pub struct Orchestrator<B: Backends> {
  gateway:    EvidenceGateway<B::Search>,
  generator:  GenerationService<B::Llm>,
  validator:  ValidationService<B::Llm>,
  repository: Repository<B>,
  config:     PipelineConfig,
}

impl<B: Backends> Clone for Orchestrator<B> {
  fn clone(&self) -> Self {
    Self {
      gateway:    self.gateway.clone(),
      generator:  self.generator.clone(),
      validator:  self.validator.clone(),
      repository: self.repository.clone(),
      config:     self.config.clone(),
    }
  }
}

impl<B: Backends> Orchestrator<B> {
  pub fn new(
    repository: Repository<B>,
    search: Arc<B::Search>,
    llm: Arc<B::Llm>,
    config: PipelineConfig,
  ) -> Self {
    let config = config.normalized();
    let timeout = config.stage_timeout();
    Self {
      gateway: EvidenceGateway::new(search, config.gateway.clone()),
      generator: GenerationService::new(Arc::clone(&llm), config.max_tokens, timeout),
      validator: ValidationService::new(llm, config.approval_threshold, timeout),
      repository,
      config,
    }
  }

  pub fn repository(&self) -> &Repository<B> { &self.repository }

  pub fn config(&self) -> &PipelineConfig { &self.config }

  /// Worst-case wall time of one run: every gateway query and every stage
  /// attempt running into its timeout.
  pub fn run_budget(&self) -> Duration {
    let queries = u32::try_from(self.config.gateway.max_queries).unwrap_or(u32::MAX);
    let attempts = self
      .config
      .attempts_per_stage
      .saturating_mul(2)
      .saturating_mul(self.config.max_iterations);
    Duration::from_secs(self.config.gateway.timeout_secs)
      .saturating_mul(queries)
      .saturating_add(self.config.stage_timeout().saturating_mul(attempts))
  }

  /// Reconcile the stores, treating pending reports older than
  /// [`run_budget`](Self::run_budget) as abandoned.
  pub async fn repair(&self) -> Result<RepairSummary, PersistenceError> {
    self.repository.repair(self.run_budget()).await
  }

  /// Run the full pipeline for `profile` and commit the result.
  ///
  /// Returns once the report is `approved` or `failed`. Errors mean the
  /// report could not be stored, or that no iteration produced a draft at
  /// all. In both cases the pending record is deleted before returning.
  pub async fn generate_report(
    &self,
    profile: &CompanyProfile,
  ) -> Result<GenerationOutcome, PipelineError> {
    profile.validate()?;

    let report = Report::pending(profile.company_name.clone());
    let report_id = report.id;
    self.transition(report_id, PipelineState::Pending);
    self.repository.create_pending(&report).await?;

    match self.run(profile, report).await {
      Ok(outcome) => Ok(outcome),
      Err(e) => {
        self.transition(report_id, PipelineState::Failed);
        if let Err(cleanup) = self.repository.delete(report_id).await {
          tracing::warn!(%report_id, error = %cleanup, "pending report left for repair");
        }
        Err(e)
      }
    }
  }

  async fn run(
    &self,
    profile: &CompanyProfile,
    mut report: Report,
  ) -> Result<GenerationOutcome, PipelineError> {
    let report_id = report.id;
    report.search_metadata = self.gateway.fetch(profile).await;
    let evidence = report.search_metadata.sources.clone();

    let max = self.config.max_iterations;
    let attempts = self.config.attempts_per_stage;
    let mut feedback: Option<ValidationRecord> = None;
    let mut last_draft: Option<ReportDraft> = None;
    let mut best: Option<(u8, ReportDraft)> = None;

    for iteration in 1..=max {
      self.transition(report_id, PipelineState::Generating { iteration });
      let prior = feedback.as_ref();
      let generated = with_retry(
        |_| self.generator.generate(profile, &evidence, prior),
        attempts,
        |attempt, e| {
          tracing::warn!(%report_id, iteration, attempt, error = %e, "generation attempt failed")
        },
      )
      .await;

      let draft = match generated {
        Ok(draft) => draft,
        Err(e) => {
          let record =
            ValidationRecord::stage_failure(iteration, format!("generation failed: {e}"));
          report.record_iteration(record)?;
          continue;
        }
      };

      self.transition(report_id, PipelineState::Validating { iteration });
      let validated = with_retry(
        |_| self.validator.validate(iteration, &draft, &evidence),
        attempts,
        |attempt, e| {
          tracing::warn!(%report_id, iteration, attempt, error = %e, "validation attempt failed")
        },
      )
      .await;
      let record = validated.unwrap_or_else(|e| {
        ValidationRecord::stage_failure(iteration, format!("validation failed: {e}"))
      });

      tracing::info!(
        %report_id,
        iteration,
        quality_score = record.quality_score,
        is_approved = record.is_approved,
        issues = record.issues.len(),
        "iteration validated"
      );

      if best.as_ref().is_none_or(|(score, _)| record.quality_score >= *score) {
        best = Some((record.quality_score, draft.clone()));
      }
      last_draft = Some(draft);

      let approved = record.is_approved;
      report.record_iteration(record.clone())?;
      if approved {
        break;
      }
      feedback = Some(record);
    }

    let approved = report.validation_history.last().is_some_and(|r| r.is_approved);
    let retained = if approved {
      last_draft
    } else {
      match self.config.retention {
        RetentionPolicy::MostRecent => last_draft,
        RetentionPolicy::HighestScoring => best.map(|(_, d)| d),
      }
    };
    if retained.is_none() {
      return Err(PipelineError::GenerationExhausted {
        report_id,
        iterations: report.iteration_count,
      });
    }

    let status = report.finish(retained)?;
    let outcome = self.repository.commit(&report).await?;
    self.transition(
      report_id,
      if status == ReportStatus::Approved { PipelineState::Approved } else { PipelineState::Failed },
    );

    Ok(GenerationOutcome {
      report_id,
      status,
      iteration_count: report.iteration_count,
      indexed: outcome.indexed,
    })
  }

  /// Run [`generate_report`](Self::generate_report) on its own task so the
  /// pipeline completes and commits even if the caller stops waiting.
  pub fn spawn(&self, profile: CompanyProfile) -> JoinHandle<Result<GenerationOutcome, PipelineError>> {
    let this = self.clone();
    tokio::spawn(async move { this.generate_report(&profile).await })
  }

  fn transition(&self, report_id: Uuid, state: PipelineState) {
    tracing::debug!(%report_id, state = ?state, "pipeline state");
  }
}
