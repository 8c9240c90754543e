//! End-to-end pipeline tests over in-memory SQLite and scripted capabilities.

use std::{sync::atomic::Ordering, time::Duration};

use chrono::Utc;
use lexroute_core::{
  capability::CapabilityError,
  chat::ChatRole,
  draft::{RiskLevel, NO_SOURCES_NOTICE},
  report::{Report, ReportStatus},
  store::{EntryKind, IndexEntry, IndexMetadata, ReportStore, SemanticIndex},
  validation::IssueCategory,
};
use uuid::Uuid;

use crate::{
  chat::DEFAULT_SUGGESTIONS,
  config::{PipelineConfig, RetentionPolicy},
  error::{ChatError, PersistenceError, PipelineError},
  fakes::{
    draft, draft_json, profile_two_routes, sample_results, verdict_json, FakeSearch, Harness,
    Route, ScriptedGenerator,
  },
};

fn draft_with_takeaway(takeaway: &str) -> String {
  let mut d = draft(RiskLevel::High);
  d.summary.key_takeaways = vec![takeaway.to_string()];
  serde_json::to_string(&d).unwrap()
}

async fn harness(llm: ScriptedGenerator) -> Harness {
  Harness::new(llm, FakeSearch::returning(sample_results()), PipelineConfig::default()).await
}

async fn approved_report(h: &Harness) -> Uuid {
  h.orchestrator
    .generate_report(&profile_two_routes())
    .await
    .unwrap()
    .report_id
}

fn approving() -> ScriptedGenerator {
  ScriptedGenerator::new()
    .with_drafts([draft_json("high")])
    .with_verdicts([verdict_json(true, 92)])
}

// ─── Loop ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn approved_on_first_iteration() {
  let h = harness(approving()).await;
  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();

  assert_eq!(outcome.status, ReportStatus::Approved);
  assert_eq!(outcome.iteration_count, 1);
  assert!(outcome.indexed);

  let report = h.repository.get(outcome.report_id).await.unwrap().unwrap();
  report.check_invariants().unwrap();
  assert_eq!(report.validation_history.len(), 1);
  assert!(report.search_metadata.evidence_available);
  assert_eq!(report.search_metadata.total_sources, 2);
  assert!(h.search.calls() > 0);
}

#[tokio::test]
async fn always_rejected_ends_failed_with_last_draft() {
  let llm = ScriptedGenerator::new()
    .with_drafts([
      draft_with_takeaway("first attempt"),
      draft_with_takeaway("second attempt"),
      draft_with_takeaway("third attempt"),
    ])
    .with_verdicts([verdict_json(false, 40)]);
  let h = harness(llm).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert_eq!(outcome.status, ReportStatus::Failed);
  assert_eq!(outcome.iteration_count, 3);

  let report = h.repository.get(outcome.report_id).await.unwrap().unwrap();
  report.check_invariants().unwrap();
  assert!(report.validation_history.iter().all(|r| !r.is_approved));
  assert_eq!(report.key_takeaways(), ["third attempt".to_string()]);
}

#[tokio::test]
async fn feedback_reaches_the_next_iteration() {
  let llm = ScriptedGenerator::new()
    .with_drafts([draft_json("high")])
    .with_verdicts([verdict_json(false, 40), verdict_json(true, 90)]);
  let h = harness(llm).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert_eq!(outcome.status, ReportStatus::Approved);
  assert_eq!(outcome.iteration_count, 2);

  let generation_prompts: Vec<String> = h
    .llm
    .prompts()
    .into_iter()
    .filter(|p| p.contains("Write the report now."))
    .collect();
  assert_eq!(generation_prompts.len(), 2);
  assert!(!generation_prompts[0].contains("too generic"));
  assert!(generation_prompts[1].contains("too generic"));
}

#[tokio::test]
async fn highest_scoring_retention_keeps_best_draft() {
  let llm = ScriptedGenerator::new()
    .with_drafts([
      draft_with_takeaway("weak"),
      draft_with_takeaway("best"),
      draft_with_takeaway("latest"),
    ])
    .with_verdicts([verdict_json(false, 55), verdict_json(false, 70), verdict_json(false, 50)]);
  let config = PipelineConfig { retention: RetentionPolicy::HighestScoring, ..Default::default() };
  let h = Harness::new(llm, FakeSearch::returning(sample_results()), config).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  let report = h.repository.get(outcome.report_id).await.unwrap().unwrap();
  assert_eq!(report.status, ReportStatus::Failed);
  assert_eq!(report.key_takeaways(), ["best".to_string()]);
}

#[tokio::test]
async fn zero_evidence_still_completes_and_says_so() {
  let h = Harness::new(approving(), FakeSearch::failing(), PipelineConfig::default()).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert!((1..=3).contains(&outcome.iteration_count));

  let report = h.repository.get(outcome.report_id).await.unwrap().unwrap();
  assert!(!report.search_metadata.evidence_available);
  assert_eq!(report.search_metadata.failed_queries, report.search_metadata.queries_used.len());
  let draft = report.current_draft.as_ref().unwrap();
  assert!(draft.states_no_sources());
  assert_eq!(draft.summary.key_takeaways[0], NO_SOURCES_NOTICE);
  assert_eq!(draft.cited_urls().count(), 0);
  assert_eq!(report.status, ReportStatus::Approved);
}

#[tokio::test]
async fn generation_retry_recovers_within_an_iteration() {
  let llm = ScriptedGenerator::new()
    .script(Route::Draft, [
      Err(CapabilityError::Transport("reset".into())),
      Ok(draft_json("high")),
    ])
    .with_verdicts([verdict_json(true, 90)]);
  let h = harness(llm).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert_eq!(outcome.iteration_count, 1);
  assert_eq!(h.llm.calls(Route::Draft), 2);
}

#[tokio::test]
async fn exhausted_generation_stage_consumes_the_iteration() {
  let llm = ScriptedGenerator::new()
    .script(Route::Draft, [
      Err(CapabilityError::Timeout(std::time::Duration::from_secs(1))),
      Ok("not json at all".to_string()),
      Ok(draft_json("high")),
    ])
    .with_verdicts([verdict_json(true, 90)]);
  let h = harness(llm).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert_eq!(outcome.status, ReportStatus::Approved);
  assert_eq!(outcome.iteration_count, 2);

  let report = h.repository.get(outcome.report_id).await.unwrap().unwrap();
  let first = &report.validation_history[0];
  assert!(!first.is_approved);
  assert_eq!(first.issues[0].category, IssueCategory::StageFailure);
}

#[tokio::test]
async fn validation_failures_count_as_rejections() {
  let llm = ScriptedGenerator::new()
    .with_drafts([draft_json("high")])
    .with_verdicts(["no opinion"]);
  let h = harness(llm).await;

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert_eq!(outcome.status, ReportStatus::Failed);
  assert_eq!(outcome.iteration_count, 3);
  let report = h.repository.get(outcome.report_id).await.unwrap().unwrap();
  assert!(report.current_draft.is_some());
}

#[tokio::test]
async fn no_draft_at_all_is_an_error_and_stores_nothing() {
  let llm = ScriptedGenerator::new().with_drafts(["still not json"]);
  let h = harness(llm).await;

  let err = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap_err();
  let PipelineError::GenerationExhausted { report_id, iterations } = err else {
    panic!("unexpected error: {err}");
  };
  assert_eq!(iterations, 3);
  assert!(h.repository.get(report_id).await.unwrap().is_none());
  assert_eq!(h.repository.stats().await.unwrap().total_reports, 0);
}

#[tokio::test]
async fn failed_commit_removes_the_pending_record() {
  let h = harness(approving()).await;
  h.store.fail_commit.store(true, Ordering::SeqCst);

  let err = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap_err();
  assert!(matches!(err, PipelineError::Persistence(PersistenceError::RecordStore(_))));
  assert_eq!(h.repository.stats().await.unwrap().total_reports, 0);
  assert_eq!(h.index.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn report_deleted_mid_run_is_not_resurrected() {
  let llm = approving().with_delay(Route::Draft, Duration::from_millis(300));
  let h = harness(llm).await;
  let run = h.orchestrator.spawn(profile_two_routes());

  tokio::time::sleep(Duration::from_millis(100)).await;
  let pending = h.store.report_ids(Some(ReportStatus::Pending)).await.unwrap();
  assert_eq!(pending.len(), 1);
  assert!(h.repository.delete(pending[0]).await.unwrap());

  let err = run.await.unwrap().unwrap_err();
  assert!(matches!(
    err,
    PipelineError::Persistence(PersistenceError::NotFound(id)) if id == pending[0]
  ));
  assert_eq!(h.repository.stats().await.unwrap().total_reports, 0);
  assert_eq!(h.index.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_profile_is_rejected_before_any_work() {
  let h = harness(approving()).await;
  let mut profile = profile_two_routes();
  profile.company_name.clear();

  let err = h.orchestrator.generate_report(&profile).await.unwrap_err();
  assert!(matches!(err, PipelineError::Core(lexroute_core::Error::InvalidProfile(_))));
  assert_eq!(h.search.calls(), 0);
  assert_eq!(h.repository.stats().await.unwrap().total_reports, 0);
}

#[tokio::test]
async fn spawned_run_commits() {
  let h = harness(approving()).await;
  let outcome = h.orchestrator.spawn(profile_two_routes()).await.unwrap().unwrap();
  assert!(h.repository.get(outcome.report_id).await.unwrap().is_some());
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_finds_report_by_summary_term() {
  let llm = ScriptedGenerator::new()
    .with_drafts([
      draft_with_takeaway("France tightens cabotage enforcement for foreign hauliers"),
      draft_with_takeaway("Austria extends the Brenner night driving ban"),
    ])
    .with_verdicts([verdict_json(true, 90)]);
  let h = harness(llm).await;
  let france = approved_report(&h).await;
  let austria = approved_report(&h).await;

  let hits = h.repository.search("cabotage enforcement", 5).await.unwrap();
  assert_eq!(hits[0].report.id, france);
  assert!(hits.iter().any(|hit| hit.report.id == austria));
  assert!(hits[0].relevance_score > hits[1].relevance_score);
}

#[tokio::test]
async fn committed_report_round_trips() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;
  let a = h.repository.get(id).await.unwrap().unwrap();
  let listed = h.repository.list(10, 0).await.unwrap();
  assert_eq!(listed.total, 1);
  assert_eq!(listed.reports, vec![a]);
}

#[tokio::test]
async fn index_failure_leaves_a_gap_that_repair_closes() {
  let h = harness(approving()).await;
  h.index.fail_upsert.store(true, Ordering::SeqCst);

  let outcome = h.orchestrator.generate_report(&profile_two_routes()).await.unwrap();
  assert!(!outcome.indexed);
  assert!(h.repository.get(outcome.report_id).await.unwrap().is_some());
  assert!(h.repository.search("tachograph", 5).await.unwrap().is_empty());

  h.index.fail_upsert.store(false, Ordering::SeqCst);
  let summary = h.orchestrator.repair().await.unwrap();
  assert_eq!(summary.reindexed, 1);

  let hits = h.repository.search("tachograph", 5).await.unwrap();
  assert_eq!(hits[0].report.id, outcome.report_id);
  // Report entry plus one per source.
  assert_eq!(h.index.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn delete_cascades_to_index_and_chat() {
  let llm = approving().with_answers(["Retrofit by August."]);
  let h = harness(llm).await;
  let id = approved_report(&h).await;
  h.chat.ask(id, "When is the deadline?").await.unwrap();

  assert!(h.repository.delete(id).await.unwrap());
  assert!(h.repository.get(id).await.unwrap().is_none());
  assert!(h.repository.search("tachograph", 5).await.unwrap().is_empty());
  assert_eq!(h.index.count(None).await.unwrap(), 0);
  assert!(h.repository.history(id).await.unwrap().is_empty());
  assert!(matches!(h.chat.ask(id, "Still there?").await, Err(ChatError::NotFound(_))));
  assert!(!h.repository.delete(id).await.unwrap());
}

#[tokio::test]
async fn orphaned_index_entries_are_filtered_then_repaired() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;

  h.index.fail_delete.store(true, Ordering::SeqCst);
  assert!(h.repository.delete(id).await.unwrap());
  assert_eq!(h.index.indexed_report_ids(EntryKind::Report).await.unwrap(), vec![id]);
  assert!(h.repository.search("tachograph", 5).await.unwrap().is_empty());

  h.index.fail_delete.store(false, Ordering::SeqCst);
  let summary = h.orchestrator.repair().await.unwrap();
  assert_eq!(summary.orphans_removed, 1);
  assert_eq!(h.index.count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn repair_expires_abandoned_pending_reports() {
  let h = harness(approving()).await;
  let budget = chrono::Duration::from_std(h.orchestrator.run_budget()).unwrap();

  let mut abandoned = Report::pending("Crashed GmbH");
  abandoned.generated_at = Utc::now() - budget - chrono::Duration::minutes(1);
  h.repository.create_pending(&abandoned).await.unwrap();
  let running = Report::pending("Running GmbH");
  h.repository.create_pending(&running).await.unwrap();

  let summary = h.orchestrator.repair().await.unwrap();
  assert_eq!(summary.expired_pending, 1);
  assert!(h.repository.get(abandoned.id).await.unwrap().is_none());
  assert!(h.repository.get(running.id).await.unwrap().is_some());
}

#[tokio::test]
async fn stale_dimension_entries_are_skipped_then_reembedded() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;
  let report = h.repository.get(id).await.unwrap().unwrap();

  // Overwrite the report entry with one from a 3-dimensional embedder.
  h.index
    .upsert(&[IndexEntry {
      id:        id.to_string(),
      report_id: id,
      kind:      EntryKind::Report,
      text:      report.embeddable_text(),
      embedding: vec![0.1, 0.2, 0.3],
      metadata:  IndexMetadata {
        company_name: report.company_name.clone(),
        generated_at: report.generated_at,
        status:       report.status,
        overall_risk: report.overall_risk(),
        origin:       None,
      },
    }])
    .await
    .unwrap();
  assert!(h.repository.search("tachograph", 5).await.unwrap().is_empty());

  let summary = h.orchestrator.repair().await.unwrap();
  assert_eq!(summary.reindexed, 1);
  assert_eq!(h.index.stale_report_ids(128).await.unwrap(), Vec::<Uuid>::new());
  let hits = h.repository.search("tachograph", 5).await.unwrap();
  assert_eq!(hits[0].report.id, id);
  assert_eq!(h.index.count(None).await.unwrap(), 3);
}

#[tokio::test]
async fn pdf_annotation_persists() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;
  h.repository.annotate_pdf(id, "/reports/elbe.pdf".into()).await.unwrap();
  let report = h.repository.get(id).await.unwrap().unwrap();
  assert_eq!(report.pdf_path.as_deref(), Some("/reports/elbe.pdf"));
}

#[tokio::test]
async fn annotation_racing_a_delete_never_restores_the_report() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;

  let (annotated, deleted) = tokio::join!(
    h.repository.annotate_pdf(id, "/reports/elbe.pdf".into()),
    h.repository.delete(id),
  );
  assert!(deleted.unwrap());
  assert!(matches!(annotated, Ok(_) | Err(PersistenceError::NotFound(_))));
  assert!(h.repository.get(id).await.unwrap().is_none());
  assert!(matches!(
    h.repository.annotate_pdf(id, "/reports/again.pdf".into()).await,
    Err(PersistenceError::NotFound(_))
  ));
}

#[tokio::test]
async fn stats_count_statuses_and_index() {
  let h = harness(approving()).await;
  approved_report(&h).await;
  h.repository.create_pending(&Report::pending("Later GmbH")).await.unwrap();

  let stats = h.repository.stats().await.unwrap();
  assert_eq!(stats.total_reports, 2);
  assert_eq!(stats.approved_reports, 1);
  assert_eq!(stats.pending_reports, 1);
  assert_eq!(stats.indexed_reports, 1);
}

// ─── Chat ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sequential_questions_keep_append_order() {
  let llm = approving().with_answers(["First answer.", "Second answer."]);
  let h = harness(llm).await;
  let id = approved_report(&h).await;

  let a1 = h.chat.ask(id, "What changes?").await.unwrap();
  let a2 = h.chat.ask(id, "By when?").await.unwrap();
  assert_eq!(a1.content, "First answer.");
  assert_eq!(a2.content, "Second answer.");
  assert!(!a1.sources.is_empty());

  let history = h.chat.history(id).await.unwrap();
  let roles: Vec<_> = history.iter().map(|m| m.role).collect();
  assert_eq!(roles, [ChatRole::User, ChatRole::Assistant, ChatRole::User, ChatRole::Assistant]);
  assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
  assert_eq!(history[3].id, a2.id);

  // The second question carried the first exchange as context.
  let chat_prompts: Vec<String> = h
    .llm
    .prompts()
    .into_iter()
    .filter(|p| p.contains("Question: "))
    .collect();
  assert!(chat_prompts[1].contains("First answer."));
}

#[tokio::test]
async fn concurrent_questions_on_one_report_stay_paired() {
  let llm = approving().with_answers(["Answer."]);
  let h = harness(llm).await;
  let id = approved_report(&h).await;

  let (a, b) = tokio::join!(h.chat.ask(id, "Question A"), h.chat.ask(id, "Question B"));
  a.unwrap();
  b.unwrap();

  let history = h.chat.history(id).await.unwrap();
  assert_eq!(history.len(), 4);
  for pair in history.chunks(2) {
    assert_eq!(pair[0].role, ChatRole::User);
    assert_eq!(pair[1].role, ChatRole::Assistant);
  }
}

#[tokio::test]
async fn chat_requires_a_committed_report() {
  let h = harness(approving()).await;
  let pending = Report::pending("Elbe Freight GmbH");
  h.repository.create_pending(&pending).await.unwrap();

  assert!(matches!(
    h.chat.ask(pending.id, "Anything?").await,
    Err(ChatError::NotReady { status: ReportStatus::Pending, .. })
  ));
  assert!(matches!(
    h.chat.ask(Uuid::new_v4(), "Anything?").await,
    Err(ChatError::NotFound(_))
  ));
}

#[tokio::test]
async fn message_length_is_bounded() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;
  assert!(matches!(h.chat.ask(id, "   ").await, Err(ChatError::InvalidMessage(_))));
  let long = "x".repeat(2001);
  assert!(matches!(h.chat.ask(id, &long).await, Err(ChatError::InvalidMessage(_))));
  assert!(h.chat.history(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_model_call_gives_degraded_answer() {
  // No chat replies are scripted, so the model call fails.
  let h = harness(approving()).await;
  let id = approved_report(&h).await;

  let answer = h.chat.ask(id, "What changes?").await.unwrap();
  assert!(answer.content.starts_with("I'm sorry"));
  assert!(answer.sources.is_empty());
  assert_eq!(h.chat.history(id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn retrieval_falls_back_to_the_record() {
  let llm = approving().with_answers(["From the record."]);
  let h = harness(llm).await;
  let id = approved_report(&h).await;
  h.index.fail_query.store(true, Ordering::SeqCst);

  let answer = h.chat.ask(id, "What changes?").await.unwrap();
  assert_eq!(answer.content, "From the record.");
  assert!(answer.sources.contains(&"report".to_string()));
}

#[tokio::test]
async fn clear_history_empties_the_transcript() {
  let llm = approving().with_answers(["ok"]);
  let h = harness(llm).await;
  let id = approved_report(&h).await;
  h.chat.ask(id, "One").await.unwrap();

  assert_eq!(h.chat.clear_history(id).await.unwrap(), 2);
  assert!(h.chat.history(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_waits_for_the_chat_turn_in_flight() {
  let llm = approving()
    .with_answers(["Retrofit by August."])
    .with_delay(Route::Chat, Duration::from_millis(300));
  let h = harness(llm).await;
  let id = approved_report(&h).await;

  let chat = h.chat.clone();
  let turn = tokio::spawn(async move { chat.ask(id, "When is the deadline?").await });
  tokio::time::sleep(Duration::from_millis(100)).await;

  assert!(h.repository.delete(id).await.unwrap());
  assert!(turn.await.unwrap().is_ok());
  assert!(h.repository.history(id).await.unwrap().is_empty());
  assert!(h.repository.get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn suggestions_are_capped_at_five() {
  let questions: Vec<String> = (1..=7).map(|i| format!("Question {i}?")).collect();
  let llm = approving().with_suggestions([serde_json::to_string(&questions).unwrap()]);
  let h = harness(llm).await;
  let id = approved_report(&h).await;

  let suggestions = h.chat.suggest(id).await.unwrap();
  assert_eq!(suggestions.len(), 5);
  assert_eq!(suggestions[0], "Question 1?");
}

#[tokio::test]
async fn suggestions_fall_back_to_defaults() {
  let h = harness(approving()).await;
  let id = approved_report(&h).await;
  assert_eq!(h.chat.suggest(id).await.unwrap(), DEFAULT_SUGGESTIONS.map(String::from));
}
