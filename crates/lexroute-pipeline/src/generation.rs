//! Generation service: profile + evidence (+ prior feedback) → draft.

use std::{sync::Arc, time::Duration};

use lexroute_core::{
  capability::{CompletionRequest, TextGenerator},
  draft::ReportDraft,
  evidence::SourceDocument,
  profile::CompanyProfile,
  validation::ValidationRecord,
};

use crate::{
  error::GenerationError,
  json::parse_reply,
  prompt::{generation_prompt, GENERATOR_SYSTEM},
  retry::with_timeout,
};

pub struct GenerationService<L> {
  llm:        Arc<L>,
  max_tokens: u32,
  timeout:    Duration,
}

impl<L> Clone for GenerationService<L> {
  fn clone(&self) -> Self {
    Self { llm: Arc::clone(&self.llm), max_tokens: self.max_tokens, timeout: self.timeout }
  }
}

impl<L: TextGenerator> GenerationService<L> {
  pub fn new(llm: Arc<L>, max_tokens: u32, timeout: Duration) -> Self {
    Self { llm, max_tokens, timeout }
  }

  /// One generation call. Inputs are only read.
  ///
  /// A draft produced without evidence is normalised so it states that no
  /// current sources were found and cites nothing.
  pub async fn generate(
    &self,
    profile: &CompanyProfile,
    evidence: &[SourceDocument],
    prior_feedback: Option<&ValidationRecord>,
  ) -> Result<ReportDraft, GenerationError> {
    let request = CompletionRequest::new(
      GENERATOR_SYSTEM,
      generation_prompt(profile, evidence, prior_feedback),
    )
    .with_max_tokens(self.max_tokens);

    let reply = with_timeout(self.timeout, self.llm.complete(&request)).await?;
    let mut draft: ReportDraft = parse_reply(&reply).map_err(GenerationError::Parse)?;

    for change in &mut draft.legal_changes {
      change.affected_countries.iter_mut().for_each(|c| *c = c.trim().to_ascii_uppercase());
    }
    if evidence.is_empty() {
      draft = draft.without_sources();
    }
    Ok(draft)
  }
}
