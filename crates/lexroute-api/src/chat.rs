//! Handlers for `/chat` endpoints. All of them 404 for an unknown report and
//! 409 while the report is still being generated.

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use lexroute_core::chat::ChatMessage;
use lexroute_pipeline::Backends;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct MessageBody {
  pub message: String,
}

/// The assistant's reply to one message.
#[derive(Debug, Serialize, Deserialize)]
pub struct Reply {
  pub message_id: Uuid,
  pub content:    String,
  /// Passage origins the answer was grounded on: `report` or a source URL.
  pub sources:    Vec<String>,
  pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for Reply {
  fn from(m: ChatMessage) -> Self {
    Self { message_id: m.id, content: m.content, sources: m.sources, created_at: m.created_at }
  }
}

/// `POST /chat/:id/message`
pub async fn send<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
  Json(body): Json<MessageBody>,
) -> Result<Json<Reply>, ApiError> {
  let reply = state.chat.ask(id, &body.message).await?;
  Ok(Json(reply.into()))
}

/// `GET /chat/:id/history`: the transcript as a bare array, oldest first.
pub async fn history<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
  Ok(Json(state.chat.history(id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
  pub deleted: usize,
}

/// `DELETE /chat/:id/history`
pub async fn clear<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ClearResponse>, ApiError> {
  let deleted = state.chat.clear_history(id).await?;
  Ok(Json(ClearResponse { deleted }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestionsResponse {
  pub suggestions: Vec<String>,
}

/// `GET /chat/:id/suggestions`
pub async fn suggestions<B: Backends>(
  State(state): State<ApiState<B>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
  let suggestions = state.chat.suggest(id).await?;
  Ok(Json(SuggestionsResponse { suggestions }))
}
