//! JSON REST API for lexroute.
//!
//! Exposes an axum [`Router`] over the pipeline services of any
//! [`Backends`] bundle. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", lexroute_api::api_router(state))
//! ```

pub mod chat;
pub mod error;
pub mod health;
pub mod profile;
pub mod reports;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use lexroute_pipeline::{Backends, ChatEngine, Orchestrator, Repository};

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<B: Backends> {
  pub orchestrator: Orchestrator<B>,
  pub chat:         ChatEngine<B>,
  /// Where the company profile is kept as a JSON document.
  pub profile_path: Arc<PathBuf>,
}

impl<B: Backends> Clone for ApiState<B> {
  fn clone(&self) -> Self {
    Self {
      orchestrator: self.orchestrator.clone(),
      chat:         self.chat.clone(),
      profile_path: Arc::clone(&self.profile_path),
    }
  }
}

impl<B: Backends> ApiState<B> {
  pub fn new(orchestrator: Orchestrator<B>, chat: ChatEngine<B>, profile_path: PathBuf) -> Self {
    Self { orchestrator, chat, profile_path: Arc::new(profile_path) }
  }

  pub(crate) fn repository(&self) -> &Repository<B> { self.orchestrator.repository() }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<B: Backends>(state: ApiState<B>) -> Router<()> {
  Router::new()
    // Reports
    .route("/reports", get(reports::list::<B>))
    .route("/reports/generate", post(reports::generate::<B>))
    .route("/reports/search", get(reports::search::<B>))
    .route("/reports/{id}", get(reports::get_one::<B>).delete(reports::delete_one::<B>))
    .route("/reports/{id}/pdf", put(reports::annotate_pdf::<B>))
    // Chat
    .route("/chat/{id}/message", post(chat::send::<B>))
    .route("/chat/{id}/history", get(chat::history::<B>).delete(chat::clear::<B>))
    .route("/chat/{id}/suggestions", get(chat::suggestions::<B>))
    // Profile
    .route("/profile", get(profile::get_profile::<B>).put(profile::put_profile::<B>))
    // Utility
    .route("/health", get(health::health))
    .route("/stats", get(health::stats::<B>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
