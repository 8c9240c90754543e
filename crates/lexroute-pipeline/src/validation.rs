//! Validation service: draft → scored, typed verdict.
//!
//! The model's judgement is combined with deterministic checks. Each local
//! finding costs points by severity, and any blocking issue prevents
//! approval whatever the score.

use std::{sync::Arc, time::Duration};

use chrono::{NaiveDate, Utc};
use lexroute_core::{
  capability::{CompletionRequest, TextGenerator},
  draft::{ReportDraft, NO_SOURCES_NOTICE},
  evidence::{canonicalize_url, SourceDocument},
  validation::{Issue, IssueCategory, Severity, ValidationRecord},
};
use serde::Deserialize;

use crate::{
  error::ValidationError,
  json::parse_reply,
  prompt::{validation_prompt, VALIDATOR_SYSTEM},
  retry::with_timeout,
};

/// Placeholder fragments that mark text as unfinished.
const PLACEHOLDERS: &[&str] = &["lorem ipsum", "tbd", "[insert", "placeholder", "xxx", "n/a"];

pub struct ValidationService<L> {
  llm:       Arc<L>,
  threshold: u8,
  timeout:   Duration,
}

impl<L> Clone for ValidationService<L> {
  fn clone(&self) -> Self {
    Self { llm: Arc::clone(&self.llm), threshold: self.threshold, timeout: self.timeout }
  }
}

#[derive(Deserialize)]
struct Verdict {
  #[serde(default)]
  is_approved:   bool,
  #[serde(default)]
  quality_score: f64,
  #[serde(default)]
  feedback:      String,
  #[serde(default)]
  issues:        Vec<RawIssue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIssue {
  Structured {
    #[serde(default)]
    category:    String,
    #[serde(default)]
    severity:    Option<String>,
    description: String,
  },
  Text(String),
}

impl RawIssue {
  fn into_issue(self) -> Issue {
    match self {
      RawIssue::Structured { category, severity, description } => Issue::new(
        IssueCategory::from_label(&category),
        severity.and_then(|s| s.parse().ok()).unwrap_or(Severity::Major),
        description,
      ),
      RawIssue::Text(text) => Issue::new(IssueCategory::from_label(&text), Severity::Major, text),
    }
  }
}

impl<L: TextGenerator> ValidationService<L> {
  pub fn new(llm: Arc<L>, threshold: u8, timeout: Duration) -> Self {
    Self { llm, threshold: threshold.min(100), timeout }
  }

  pub fn threshold(&self) -> u8 { self.threshold }

  /// Score `draft` for loop iteration `iteration`. `evidence` is what the
  /// writer had available; citations outside it are flagged.
  pub async fn validate(
    &self,
    iteration: u32,
    draft: &ReportDraft,
    evidence: &[SourceDocument],
  ) -> Result<ValidationRecord, ValidationError> {
    let request = CompletionRequest::new(VALIDATOR_SYSTEM, validation_prompt(draft, evidence))
      .with_max_tokens(1500);
    let reply = with_timeout(self.timeout, self.llm.complete(&request)).await?;
    let verdict: Verdict = parse_reply(&reply).map_err(ValidationError::Parse)?;

    let local = local_checks(draft, evidence);
    let penalty: u32 = local.iter().map(|i| penalty(i.severity)).sum();
    let model_score = verdict.quality_score.clamp(0.0, 100.0).round() as u32;
    let quality_score = model_score.saturating_sub(penalty) as u8;

    let mut issues: Vec<Issue> = verdict.issues.into_iter().map(RawIssue::into_issue).collect();
    issues.extend(local.iter().cloned());

    let blocking = issues.iter().any(|i| i.severity == Severity::Blocking);
    let is_approved = verdict.is_approved && quality_score >= self.threshold && !blocking;

    let mut feedback_text = verdict.feedback.trim().to_string();
    for issue in &local {
      if !feedback_text.is_empty() {
        feedback_text.push('\n');
      }
      feedback_text.push_str(&format!("[{}] {}", issue.severity, issue.description));
    }

    tracing::debug!(
      iteration,
      model_score,
      quality_score,
      local_issues = local.len(),
      is_approved,
      "draft validated"
    );

    Ok(ValidationRecord {
      iteration,
      is_approved,
      quality_score,
      feedback_text,
      issues,
      validated_at: Utc::now(),
    })
  }
}

fn penalty(severity: Severity) -> u32 {
  match severity {
    Severity::Blocking => 25,
    Severity::Major => 10,
    Severity::Minor => 3,
  }
}

/// Deterministic completeness, specificity and consistency checks.
pub fn local_checks(draft: &ReportDraft, evidence: &[SourceDocument]) -> Vec<Issue> {
  let mut issues = Vec::new();
  let summary = &draft.summary;

  // Completeness
  if summary.key_takeaways.iter().all(|t| t.trim().is_empty()) {
    issues.push(Issue::new(
      IssueCategory::Completeness,
      Severity::Major,
      "summary has no key takeaways",
    ));
  }
  if draft.recommended_actions.is_empty() {
    issues.push(Issue::new(
      IssueCategory::Completeness,
      Severity::Minor,
      "no recommended actions",
    ));
  }
  for (i, change) in draft.legal_changes.iter().enumerate() {
    if change.title.trim().is_empty() || change.description.trim().is_empty() {
      issues.push(Issue::new(
        IssueCategory::Completeness,
        Severity::Major,
        format!("legal change {} lacks a title or description", i + 1),
      ));
    }
  }

  // Specificity
  if let Some(text) = all_text(draft).find(|t| has_placeholder(t)) {
    issues.push(Issue::new(
      IssueCategory::Specificity,
      Severity::Blocking,
      format!("placeholder text: {:?}", truncate(text, 60)),
    ));
  }

  // Consistency
  if summary.total_changes != draft.legal_changes.len() {
    issues.push(Issue::new(
      IssueCategory::Consistency,
      Severity::Major,
      format!(
        "summary counts {} changes but {} are listed",
        summary.total_changes,
        draft.legal_changes.len()
      ),
    ));
  }
  if let Some(max) = draft.highest_item_risk() {
    if summary.overall_risk < max {
      issues.push(Issue::new(
        IssueCategory::Consistency,
        Severity::Major,
        format!("overall risk {} is below the highest itemised risk {max}", summary.overall_risk),
      ));
    }
  }

  // Sourcing
  if evidence.is_empty() && !draft.states_no_sources() {
    issues.push(Issue::new(
      IssueCategory::Sourcing,
      Severity::Blocking,
      format!("no evidence was available but the draft does not say: {NO_SOURCES_NOTICE}"),
    ));
  }
  let known: Vec<String> = evidence.iter().map(SourceDocument::canonical_url).collect();
  for url in draft.cited_urls() {
    if !known.contains(&canonicalize_url(url)) {
      issues.push(Issue::new(
        IssueCategory::Sourcing,
        Severity::Blocking,
        format!("cites {url}, which is not among the supplied sources"),
      ));
    }
  }

  // Formatting
  let dates = draft
    .legal_changes
    .iter()
    .filter_map(|c| c.effective_date.as_deref())
    .chain(draft.recommended_actions.iter().filter_map(|a| a.deadline.as_deref()));
  for date in dates {
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
      issues.push(Issue::new(
        IssueCategory::Formatting,
        Severity::Minor,
        format!("date {date:?} is not YYYY-MM-DD"),
      ));
    }
  }

  issues
}

fn all_text(draft: &ReportDraft) -> impl Iterator<Item = &str> {
  draft
    .summary
    .key_takeaways
    .iter()
    .map(String::as_str)
    .chain(draft.legal_changes.iter().flat_map(|c| [c.title.as_str(), c.description.as_str()]))
    .chain(draft.route_impacts.iter().flat_map(|r| {
      std::iter::once(r.impact_description.as_str())
        .chain(r.recommended_actions.iter().map(String::as_str))
    }))
    .chain(draft.recommended_actions.iter().map(|a| a.action.as_str()))
}

fn has_placeholder(text: &str) -> bool {
  let lower = text.to_lowercase();
  PLACEHOLDERS.iter().any(|p| {
    lower
      .match_indices(p)
      .any(|(i, _)| word_boundary(&lower, i, p.len()))
  })
}

fn word_boundary(text: &str, start: usize, len: usize) -> bool {
  let before = text[..start].chars().next_back();
  let after = text[start + len..].chars().next();
  let edge = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
  edge(before) && edge(after)
}

fn truncate(text: &str, max: usize) -> String {
  text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
  use lexroute_core::draft::RiskLevel;

  use super::*;
  use crate::fakes::{draft, sample_sources, verdict_json, ScriptedGenerator};

  fn service(llm: ScriptedGenerator) -> ValidationService<ScriptedGenerator> {
    ValidationService::new(Arc::new(llm), 75, Duration::from_secs(5))
  }

  #[test]
  fn clean_draft_has_no_local_issues() {
    assert!(local_checks(&draft(RiskLevel::High), &sample_sources()).is_empty());
  }

  #[test]
  fn understated_overall_risk_is_flagged() {
    let mut d = draft(RiskLevel::High);
    d.summary.overall_risk = RiskLevel::Low;
    let issues = local_checks(&d, &sample_sources());
    assert!(issues.iter().any(|i| i.category == IssueCategory::Consistency));
  }

  #[test]
  fn placeholders_block_approval() {
    let mut d = draft(RiskLevel::High);
    d.legal_changes[0].description = "Details TBD.".into();
    let issues = local_checks(&d, &sample_sources());
    assert!(issues
      .iter()
      .any(|i| i.category == IssueCategory::Specificity && i.severity == Severity::Blocking));
  }

  #[test]
  fn placeholder_match_respects_word_boundaries() {
    assert!(!has_placeholder("Annual standard update"));
    assert!(has_placeholder("tbd"));
  }

  #[test]
  fn unknown_citation_is_blocking() {
    let mut d = draft(RiskLevel::High);
    d.legal_changes[0].source_url = Some("https://made-up.example/rule".into());
    let issues = local_checks(&d, &sample_sources());
    assert!(issues
      .iter()
      .any(|i| i.category == IssueCategory::Sourcing && i.severity == Severity::Blocking));
  }

  #[test]
  fn empty_evidence_requires_the_notice() {
    let d = draft(RiskLevel::High);
    let issues = local_checks(&d, &[]);
    // The sample draft cites a URL and lacks the notice.
    assert!(issues.iter().filter(|i| i.category == IssueCategory::Sourcing).count() >= 2);

    let normalised = d.without_sources();
    assert!(local_checks(&normalised, &[])
      .iter()
      .all(|i| i.category != IssueCategory::Sourcing));
  }

  #[tokio::test]
  async fn approval_needs_threshold_and_model_agreement() {
    let llm = ScriptedGenerator::new().with_verdicts([verdict_json(true, 90)]);
    let record = service(llm)
      .validate(1, &draft(RiskLevel::High), &sample_sources())
      .await
      .unwrap();
    assert!(record.is_approved);
    assert_eq!(record.quality_score, 90);
    assert_eq!(record.iteration, 1);
  }

  #[tokio::test]
  async fn local_penalties_can_sink_the_score() {
    let llm = ScriptedGenerator::new().with_verdicts([verdict_json(true, 80)]);
    let mut d = draft(RiskLevel::High);
    d.summary.total_changes = 4;
    let record = service(llm).validate(2, &d, &sample_sources()).await.unwrap();
    assert_eq!(record.quality_score, 70);
    assert!(!record.is_approved);
    assert!(record.feedback_text.contains("summary counts 4 changes"));
  }

  #[tokio::test]
  async fn string_issues_are_accepted() {
    let reply = r#"{"is_approved": false, "quality_score": 40, "feedback": "weak",
                    "issues": ["too generic", "missing deadlines"]}"#;
    let llm = ScriptedGenerator::new().with_verdicts([reply]);
    let record = service(llm)
      .validate(1, &draft(RiskLevel::High), &sample_sources())
      .await
      .unwrap();
    assert!(!record.is_approved);
    assert_eq!(record.issues[0].category, IssueCategory::Specificity);
    assert_eq!(record.issues[1].category, IssueCategory::Completeness);
  }

  #[tokio::test]
  async fn garbage_reply_is_a_parse_error() {
    let llm = ScriptedGenerator::new().with_verdicts(["looks fine to me"]);
    let err = service(llm)
      .validate(1, &draft(RiskLevel::High), &sample_sources())
      .await
      .unwrap_err();
    assert!(matches!(err, ValidationError::Parse(_)));
  }
}
