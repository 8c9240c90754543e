//! Router tests over in-memory SQLite and scripted capabilities.

use axum::{
  Router,
  body::Body,
  http::{Method, Request, StatusCode, header},
};
use lexroute_core::report::Report;
use lexroute_pipeline::{
  PipelineConfig,
  fakes::{
    FakeSearch, Harness, ScriptedGenerator, draft_json, profile_two_routes, sample_results,
    verdict_json,
  },
};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::{ApiState, api_router};

struct TestApp {
  router:  Router,
  harness: Harness,
}

async fn app_with(llm: ScriptedGenerator) -> TestApp {
  let harness =
    Harness::new(llm, FakeSearch::returning(sample_results()), PipelineConfig::default()).await;
  let profile_path = std::env::temp_dir()
    .join(format!("lexroute-api-{}", Uuid::new_v4()))
    .join("profile.json");
  let state = ApiState::new(harness.orchestrator.clone(), harness.chat.clone(), profile_path);
  TestApp { router: api_router(state), harness }
}

async fn app() -> TestApp {
  app_with(
    ScriptedGenerator::new()
      .with_drafts([draft_json("high")])
      .with_verdicts([verdict_json(true, 90)])
      .with_answers(["Retrofit all 12 trucks before August."]),
  )
  .await
}

async fn call(app: &TestApp, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut req = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(v) => {
      req = req.header(header::CONTENT_TYPE, "application/json");
      Body::from(v.to_string())
    }
    None => Body::empty(),
  };
  let resp = app.router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, value)
}

async fn generated(app: &TestApp) -> String {
  let (status, body) = call(
    app,
    Method::POST,
    "/reports/generate",
    Some(json!({ "profile": profile_two_routes() })),
  )
  .await;
  assert_eq!(status, StatusCode::OK, "{body}");
  body["report_id"].as_str().unwrap().to_string()
}

// ─── Reports ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn generate_then_read_back() {
  let app = app().await;
  let (status, body) = call(
    &app,
    Method::POST,
    "/reports/generate",
    Some(json!({ "profile": profile_two_routes() })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "approved");
  assert_eq!(body["iteration_count"], 1);
  let id = body["report_id"].as_str().unwrap();

  let (status, report) = call(&app, Method::GET, &format!("/reports/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(report["company_name"], "Elbe Freight GmbH");
  assert_eq!(report["validation_history"].as_array().unwrap().len(), 1);

  let (_, page) = call(&app, Method::GET, "/reports?limit=10", None).await;
  assert_eq!(page["total"], 1);
  assert_eq!(page["reports"][0]["id"], id);
}

#[tokio::test]
async fn generate_without_any_profile_is_rejected() {
  let app = app().await;
  let (status, body) = call(&app, Method::POST, "/reports/generate", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("profile"));
}

#[tokio::test]
async fn generate_with_invalid_profile_is_rejected() {
  let app = app().await;
  let mut profile = profile_two_routes();
  profile.company_name.clear();
  let (status, _) =
    call(&app, Method::POST, "/reports/generate", Some(json!({ "profile": profile }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_is_bad_gateway_when_no_draft_is_produced() {
  let app = app_with(ScriptedGenerator::new().with_drafts(["not a report"])).await;
  let (status, body) = call(
    &app,
    Method::POST,
    "/reports/generate",
    Some(json!({ "profile": profile_two_routes() })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_GATEWAY);
  assert!(body["error"].as_str().unwrap().contains("no draft produced in 3 iterations"));

  let (status, listed) = call(&app, Method::GET, "/reports", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn search_returns_ranked_hits() {
  let app = app().await;
  let id = generated(&app).await;

  let (status, body) = call(&app, Method::GET, "/reports/search?q=tachograph%20retrofit", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["query"], "tachograph retrofit");
  assert_eq!(body["total"], 1);
  assert_eq!(body["results"][0]["report"]["id"], id.as_str());
  assert!(body["results"][0]["relevance_score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn query_bounds_are_enforced() {
  let app = app().await;
  for uri in ["/reports?limit=0", "/reports?limit=101", "/reports/search", "/reports/search?q=x&limit=51"] {
    let (status, _) = call(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
  }
}

#[tokio::test]
async fn unknown_report_is_404() {
  let app = app().await;
  let id = Uuid::new_v4();
  let (status, body) = call(&app, Method::GET, &format!("/reports/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].is_string());

  let (status, _) = call(&app, Method::DELETE, &format!("/reports/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_report_and_search_hits() {
  let app = app().await;
  let id = generated(&app).await;

  let (status, _) = call(&app, Method::DELETE, &format!("/reports/{id}"), None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (status, _) = call(&app, Method::GET, &format!("/reports/{id}"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (_, body) = call(&app, Method::GET, "/reports/search?q=tachograph", None).await;
  assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn pdf_annotation_requires_a_committed_report() {
  let app = app().await;
  let pending = Report::pending("Elbe Freight GmbH");
  app.harness.repository.create_pending(&pending).await.unwrap();

  let (status, _) = call(
    &app,
    Method::PUT,
    &format!("/reports/{}/pdf", pending.id),
    Some(json!({ "pdf_path": "/tmp/a.pdf" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let id = generated(&app).await;
  let (status, body) = call(
    &app,
    Method::PUT,
    &format!("/reports/{id}/pdf"),
    Some(json!({ "pdf_path": "/tmp/a.pdf" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["pdf_path"], "/tmp/a.pdf");
}

// ─── Chat ─────────────────────────────────────────────────────────────────────

async fn ask(app: &TestApp, id: &str, text: &str) -> StatusCode {
  let body = json!({ "message": text });
  call(app, Method::POST, &format!("/chat/{id}/message"), Some(body)).await.0
}

#[tokio::test]
async fn chat_round_trip() {
  let app = app().await;
  let id = generated(&app).await;

  let (status, reply) = call(
    &app,
    Method::POST,
    &format!("/chat/{id}/message"),
    Some(json!({ "message": "What must we do?" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(reply["content"], "Retrofit all 12 trucks before August.");
  assert!(!reply["sources"].as_array().unwrap().is_empty());

  let (_, history) = call(&app, Method::GET, &format!("/chat/{id}/history"), None).await;
  let messages = history.as_array().unwrap();
  assert_eq!(messages.len(), 2);
  assert_eq!(messages[0]["role"], "user");
  assert_eq!(messages[0]["content"], "What must we do?");
  assert_eq!(messages[1]["id"], reply["message_id"]);

  let (_, cleared) = call(&app, Method::DELETE, &format!("/chat/{id}/history"), None).await;
  assert_eq!(cleared["deleted"], 2);
  let (_, history) = call(&app, Method::GET, &format!("/chat/{id}/history"), None).await;
  assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn chat_status_codes() {
  let app = app().await;
  let pending = Report::pending("Elbe Freight GmbH");
  app.harness.repository.create_pending(&pending).await.unwrap();
  let unknown = Uuid::new_v4().to_string();
  assert_eq!(ask(&app, &unknown, "hi").await, StatusCode::NOT_FOUND);
  assert_eq!(ask(&app, &pending.id.to_string(), "hi").await, StatusCode::CONFLICT);

  let id = generated(&app).await;
  assert_eq!(ask(&app, &id, "").await, StatusCode::BAD_REQUEST);
  assert_eq!(ask(&app, &id, &"x".repeat(2001)).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn suggestions_fall_back_to_defaults() {
  let app = app().await;
  let id = generated(&app).await;
  let (status, body) = call(&app, Method::GET, &format!("/chat/{id}/suggestions"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
}

// ─── Profile and utility ──────────────────────────────────────────────────────

#[tokio::test]
async fn stored_profile_drives_generation() {
  let app = app().await;
  let (status, _) = call(&app, Method::GET, "/profile", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let mut bad = profile_two_routes();
  bad.routes[0].origin.country_code = "DEU".into();
  let (status, _) = call(&app, Method::PUT, "/profile", Some(json!(bad))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = call(&app, Method::PUT, "/profile", Some(json!(profile_two_routes()))).await;
  assert_eq!(status, StatusCode::OK);
  let (status, stored) = call(&app, Method::GET, "/profile", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(stored["company_name"], "Elbe Freight GmbH");

  let (status, body) = call(&app, Method::POST, "/reports/generate", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "approved");
}

#[tokio::test]
async fn health_and_stats() {
  let app = app().await;
  let (status, health) = call(&app, Method::GET, "/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(health["status"], "ok");

  generated(&app).await;
  let (status, stats) = call(&app, Method::GET, "/stats", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(stats["total_reports"], 1);
  assert_eq!(stats["approved_reports"], 1);
  assert_eq!(stats["indexed_reports"], 1);
}
