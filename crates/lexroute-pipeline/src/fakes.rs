//! Deterministic capability fakes, fixtures and a wired-up test harness.
//!
//! Compiled for this crate's tests and, behind the `fakes` feature, for
//! downstream crates' tests.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
  },
  time::Duration,
};

use chrono::Utc;
use lexroute_core::{
  capability::{CapabilityError, CompletionRequest, SearchResult, TextGenerator, WebSearch},
  chat::ChatMessage,
  draft::{LegalChange, RecommendedAction, ReportDraft, ReportSummary, RiskLevel, RouteImpact},
  evidence::SourceDocument,
  profile::{
    CargoCategory, CompanyProfile, FleetVehicle, RoutePoint, TransportRoute, VehicleType,
  },
  report::{Report, ReportStatus, StatusCounts},
  store::{
    ChatStore, EntryKind, IndexEntry, IndexHit, IndexQuery, ReportStore, SemanticIndex,
  },
};
use lexroute_store_sqlite::{SqliteIndex, SqliteStore};
use uuid::Uuid;

use crate::{
  backends::{Backends, Repository},
  chat::ChatEngine,
  config::{ChatConfig, PipelineConfig},
  embedding::HashingEmbedder,
  orchestrator::Orchestrator,
  prompt::{CHAT_SYSTEM, GENERATOR_SYSTEM, SUGGEST_SYSTEM, VALIDATOR_SYSTEM},
  repository::ReportRepository,
};

// ─── Scripted text generator ─────────────────────────────────────────────────

/// Which pipeline call a completion request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
  Draft,
  Verdict,
  Chat,
  Suggest,
}

impl Route {
  fn of(request: &CompletionRequest) -> Option<Self> {
    match request.system.as_deref()? {
      s if s == GENERATOR_SYSTEM => Some(Self::Draft),
      s if s == VALIDATOR_SYSTEM => Some(Self::Verdict),
      s if s == CHAT_SYSTEM => Some(Self::Chat),
      s if s == SUGGEST_SYSTEM => Some(Self::Suggest),
      _ => None,
    }
  }
}

/// Replies are queued per route. The last reply of a route repeats forever;
/// a route with nothing queued fails with `Unavailable`.
#[derive(Default)]
pub struct ScriptedGenerator {
  replies: Mutex<HashMap<Route, VecDeque<Result<String, CapabilityError>>>>,
  delays:  Mutex<HashMap<Route, Duration>>,
  prompts: Mutex<Vec<String>>,
  calls:   Mutex<HashMap<Route, usize>>,
}

impl ScriptedGenerator {
  pub fn new() -> Self { Self::default() }

  pub fn script(
    self,
    route: Route,
    replies: impl IntoIterator<Item = Result<String, CapabilityError>>,
  ) -> Self {
    self
      .replies
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(route)
      .or_default()
      .extend(replies);
    self
  }

  pub fn with_drafts<T: Into<String>>(self, replies: impl IntoIterator<Item = T>) -> Self {
    self.script(Route::Draft, replies.into_iter().map(|r| Ok(r.into())))
  }

  pub fn with_verdicts<T: Into<String>>(self, replies: impl IntoIterator<Item = T>) -> Self {
    self.script(Route::Verdict, replies.into_iter().map(|r| Ok(r.into())))
  }

  pub fn with_answers<T: Into<String>>(self, replies: impl IntoIterator<Item = T>) -> Self {
    self.script(Route::Chat, replies.into_iter().map(|r| Ok(r.into())))
  }

  pub fn with_suggestions<T: Into<String>>(self, replies: impl IntoIterator<Item = T>) -> Self {
    self.script(Route::Suggest, replies.into_iter().map(|r| Ok(r.into())))
  }

  /// Hold every reply on `route` back by `delay`.
  pub fn with_delay(self, route: Route, delay: Duration) -> Self {
    self.delays.lock().unwrap_or_else(PoisonError::into_inner).insert(route, delay);
    self
  }

  /// Every user prompt seen so far, in call order.
  pub fn prompts(&self) -> Vec<String> {
    self.prompts.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  pub fn calls(&self, route: Route) -> usize {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&route)
      .copied()
      .unwrap_or(0)
  }
}

impl TextGenerator for ScriptedGenerator {
  async fn complete(&self, request: &CompletionRequest) -> Result<String, CapabilityError> {
    self
      .prompts
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(request.prompt.clone());
    let Some(route) = Route::of(request) else {
      return Err(CapabilityError::Rejected { status: 400, body: "unknown system prompt".into() });
    };
    *self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(route)
      .or_default() += 1;

    let reply = {
      let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
      let queue = replies.entry(route).or_default();
      match queue.len() {
        0 => Err(CapabilityError::Unavailable(format!("no scripted reply for {route:?}"))),
        1 => queue
          .front()
          .cloned()
          .unwrap_or_else(|| Err(CapabilityError::Unavailable("empty".into()))),
        _ => queue
          .pop_front()
          .unwrap_or_else(|| Err(CapabilityError::Unavailable("empty".into()))),
      }
    };
    let delay = self.delays.lock().unwrap_or_else(PoisonError::into_inner).get(&route).copied();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    reply
  }
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Answers every query with the same results, or fails every query.
pub struct FakeSearch {
  results: Option<Vec<SearchResult>>,
  calls:   AtomicUsize,
}

impl FakeSearch {
  pub fn returning(results: Vec<SearchResult>) -> Self {
    Self { results: Some(results), calls: AtomicUsize::new(0) }
  }

  pub fn failing() -> Self { Self { results: None, calls: AtomicUsize::new(0) } }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl WebSearch for FakeSearch {
  async fn search(
    &self,
    _query: &str,
    max_results: usize,
  ) -> Result<Vec<SearchResult>, CapabilityError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    match &self.results {
      Some(results) => Ok(results.iter().take(max_results).cloned().collect()),
      None => Err(CapabilityError::Transport("connection refused".into())),
    }
  }
}

// ─── Fault injection ─────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FaultError {
  #[error("injected fault")]
  Injected,

  #[error("{0}")]
  Inner(String),
}

/// Wraps an index and fails selected operations on demand.
pub struct FaultyIndex<I> {
  inner:           I,
  pub fail_upsert: AtomicBool,
  pub fail_delete: AtomicBool,
  pub fail_query:  AtomicBool,
}

impl<I> FaultyIndex<I> {
  pub fn new(inner: I) -> Self {
    Self {
      inner,
      fail_upsert: AtomicBool::new(false),
      fail_delete: AtomicBool::new(false),
      fail_query: AtomicBool::new(false),
    }
  }
}

fn inner<E: std::fmt::Display>(e: E) -> FaultError { FaultError::Inner(e.to_string()) }

impl<I: SemanticIndex> SemanticIndex for FaultyIndex<I> {
  type Error = FaultError;

  async fn upsert(&self, entries: &[IndexEntry]) -> Result<(), FaultError> {
    if self.fail_upsert.load(Ordering::SeqCst) {
      return Err(FaultError::Injected);
    }
    self.inner.upsert(entries).await.map_err(inner)
  }

  async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexHit>, FaultError> {
    if self.fail_query.load(Ordering::SeqCst) {
      return Err(FaultError::Injected);
    }
    self.inner.query(query).await.map_err(inner)
  }

  async fn delete_report(&self, report_id: Uuid) -> Result<usize, FaultError> {
    if self.fail_delete.load(Ordering::SeqCst) {
      return Err(FaultError::Injected);
    }
    self.inner.delete_report(report_id).await.map_err(inner)
  }

  async fn indexed_report_ids(&self, kind: EntryKind) -> Result<Vec<Uuid>, FaultError> {
    self.inner.indexed_report_ids(kind).await.map_err(inner)
  }

  async fn stale_report_ids(&self, dimensions: usize) -> Result<Vec<Uuid>, FaultError> {
    self.inner.stale_report_ids(dimensions).await.map_err(inner)
  }

  async fn count(&self, kind: Option<EntryKind>) -> Result<usize, FaultError> {
    self.inner.count(kind).await.map_err(inner)
  }
}

/// Wraps a record store; `fail_commit` rejects overwrites of existing
/// reports while inserts and deletes keep working.
pub struct FaultyStore<S> {
  inner:           S,
  pub fail_commit: AtomicBool,
}

impl<S> FaultyStore<S> {
  pub fn new(inner: S) -> Self { Self { inner, fail_commit: AtomicBool::new(false) } }
}

impl<S: ReportStore> ReportStore for FaultyStore<S> {
  type Error = FaultError;

  async fn upsert_report(&self, report: &Report) -> Result<(), FaultError> {
    self.inner.upsert_report(report).await.map_err(inner)
  }

  async fn replace_report(&self, report: &Report) -> Result<bool, FaultError> {
    if self.fail_commit.load(Ordering::SeqCst) {
      return Err(FaultError::Injected);
    }
    self.inner.replace_report(report).await.map_err(inner)
  }

  async fn get_report(&self, id: Uuid) -> Result<Option<Report>, FaultError> {
    self.inner.get_report(id).await.map_err(inner)
  }

  async fn list_reports(&self, limit: usize, offset: usize) -> Result<Vec<Report>, FaultError> {
    self.inner.list_reports(limit, offset).await.map_err(inner)
  }

  async fn delete_report(&self, id: Uuid) -> Result<bool, FaultError> {
    self.inner.delete_report(id).await.map_err(inner)
  }

  async fn report_ids(&self, status: Option<ReportStatus>) -> Result<Vec<Uuid>, FaultError> {
    self.inner.report_ids(status).await.map_err(inner)
  }

  async fn count_by_status(&self) -> Result<StatusCounts, FaultError> {
    self.inner.count_by_status().await.map_err(inner)
  }
}

impl<S: ChatStore> ChatStore for FaultyStore<S> {
  type Error = FaultError;

  async fn append_messages(&self, messages: &[ChatMessage]) -> Result<(), FaultError> {
    self.inner.append_messages(messages).await.map_err(inner)
  }

  async fn history(&self, report_id: Uuid) -> Result<Vec<ChatMessage>, FaultError> {
    self.inner.history(report_id).await.map_err(inner)
  }

  async fn clear_history(&self, report_id: Uuid) -> Result<usize, FaultError> {
    self.inner.clear_history(report_id).await.map_err(inner)
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct FakeBackends;

impl Backends for FakeBackends {
  type Store = FaultyStore<SqliteStore>;
  type Index = FaultyIndex<SqliteIndex>;
  type Search = FakeSearch;
  type Llm = ScriptedGenerator;
  type Embed = HashingEmbedder;
}

/// Every service wired over in-memory SQLite and the fakes above.
pub struct Harness {
  pub orchestrator: Orchestrator<FakeBackends>,
  pub chat:         ChatEngine<FakeBackends>,
  pub repository:   Repository<FakeBackends>,
  pub llm:          Arc<ScriptedGenerator>,
  pub search:       Arc<FakeSearch>,
  pub store:        Arc<FaultyStore<SqliteStore>>,
  pub index:        Arc<FaultyIndex<SqliteIndex>>,
}

impl Harness {
  pub async fn new(llm: ScriptedGenerator, search: FakeSearch, config: PipelineConfig) -> Self {
    let store =
      Arc::new(FaultyStore::new(SqliteStore::open_in_memory().await.expect("in-memory store")));
    let index = Arc::new(FaultyIndex::new(
      SqliteIndex::open_in_memory().await.expect("in-memory index"),
    ));
    let llm = Arc::new(llm);
    let search = Arc::new(search);
    let repository = ReportRepository::new(
      Arc::clone(&store),
      Arc::clone(&index),
      Arc::new(HashingEmbedder::new(128)),
    );

    Self {
      orchestrator: Orchestrator::new(
        repository.clone(),
        Arc::clone(&search),
        Arc::clone(&llm),
        config,
      ),
      chat: ChatEngine::new(repository.clone(), Arc::clone(&llm), ChatConfig::default()),
      repository,
      llm,
      search,
      store,
      index,
    }
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// A haulier running Hamburg to Warsaw and Hamburg to Vienna via Prague with trucks
/// carrying dangerous goods.
pub fn profile_two_routes() -> CompanyProfile {
  let point = |code: &str, city: &str| RoutePoint {
    country_code: code.into(),
    city:         Some(city.into()),
  };
  CompanyProfile {
    company_name:           "Elbe Freight GmbH".into(),
    contact:                [("email".to_string(), "ops@elbe-freight.example".to_string())].into(),
    fleet:                  vec![FleetVehicle { vehicle_type: VehicleType::Truck, quantity: 12 }],
    routes:                 vec![
      TransportRoute {
        name:              "Hamburg - Warsaw".into(),
        origin:            point("DE", "Hamburg"),
        destination:       point("PL", "Warsaw"),
        transit_countries: vec![],
      },
      TransportRoute {
        name:              "Hamburg - Vienna".into(),
        origin:            point("DE", "Hamburg"),
        destination:       point("AT", "Vienna"),
        transit_countries: vec!["CZ".into()],
      },
    ],
    cargo_categories:       vec![CargoCategory::Standard, CargoCategory::Hazardous],
    monitoring_preferences: serde_json::Map::new(),
  }
}

pub fn sample_sources() -> Vec<SourceDocument> {
  vec![
    SourceDocument {
      url:            "https://transport.ec.europa.eu/smart-tachograph".into(),
      title:          "Smart tachograph version 2 deadlines".into(),
      snippet:        "International trucks must retrofit smart tachographs by mid 2025.".into(),
      published_date: Some("2024-12-10".into()),
      retrieved_at:   Utc::now(),
    },
    SourceDocument {
      url:            "https://unece.org/adr-2025".into(),
      title:          "ADR 2025 amendments".into(),
      snippet:        "Dangerous goods packaging and training changes apply from July 2025.".into(),
      published_date: None,
      retrieved_at:   Utc::now(),
    },
  ]
}

pub fn sample_results() -> Vec<SearchResult> {
  sample_sources()
    .into_iter()
    .map(|d| SearchResult {
      url:            d.url,
      title:          d.title,
      snippet:        d.snippet,
      published_date: d.published_date,
    })
    .collect()
}

/// A clean, internally consistent draft citing the first sample source.
pub fn draft(risk: RiskLevel) -> ReportDraft {
  ReportDraft {
    summary:             ReportSummary {
      total_changes: 1,
      overall_risk:  risk,
      key_takeaways: vec!["Smart tachograph retrofit deadline for international trucks".into()],
    },
    legal_changes:       vec![LegalChange {
      title:              "Smart tachograph retrofit".into(),
      description:        "Trucks in international transport need version 2 tachographs.".into(),
      effective_date:     Some("2025-08-19".into()),
      affected_countries: vec!["de".into(), "PL".into()],
      risk_level:         risk,
      source_url:         Some("https://transport.ec.europa.eu/smart-tachograph".into()),
    }],
    route_impacts:       vec![RouteImpact {
      route_name:          "Hamburg - Warsaw".into(),
      impact_description:  "Every truck on this lane crosses a border and needs the retrofit.".into(),
      risk_level:          risk,
      recommended_actions: vec!["Book workshop slots for the Warsaw fleet".into()],
    }],
    recommended_actions: vec![RecommendedAction {
      priority: risk,
      action:   "Schedule tachograph retrofits for all 12 trucks".into(),
      deadline: Some("2025-06-30".into()),
    }],
  }
}

/// [`draft`] as the JSON a model would return; `risk` is a lowercase level.
pub fn draft_json(risk: &str) -> String {
  let level: RiskLevel = risk.parse().unwrap_or(RiskLevel::Medium);
  serde_json::to_string(&draft(level)).unwrap_or_default()
}

pub fn verdict_json(approved: bool, score: u8) -> String {
  serde_json::json!({
    "is_approved": approved,
    "quality_score": score,
    "feedback": if approved { "Report meets quality standards" } else { "Needs more detail" },
    "issues": if approved {
      serde_json::json!([])
    } else {
      serde_json::json!([{"category": "specificity", "severity": "major", "description": "too generic"}])
    },
  })
  .to_string()
}
