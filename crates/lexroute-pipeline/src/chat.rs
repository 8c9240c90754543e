//! Retrieval-grounded chat about one committed report.
//!
//! A turn holds the report's repository lock from the transcript read to the
//! append, so turns for one report are serialised and a delete waits for the
//! turn in flight.

use std::{sync::Arc, time::Duration};

use lexroute_core::{
  capability::{CompletionRequest, TextGenerator},
  chat::{message_in_bounds, ChatMessage, MAX_MESSAGE_CHARS},
  report::Report,
};
use uuid::Uuid;

use crate::{
  backends::{Backends, Repository},
  config::ChatConfig,
  error::ChatError,
  json::parse_reply,
  prompt::{chat_prompt, suggestion_prompt, PromptPassage, CHAT_SYSTEM, SUGGEST_SYSTEM},
  retry::with_timeout,
};

const MAX_SUGGESTIONS: usize = 5;

pub const DEFAULT_SUGGESTIONS: [&str; 3] = [
  "What are the main risks identified in this report?",
  "Which routes are most affected by these changes?",
  "What actions should I take first?",
];

const DEGRADED_ANSWER: &str =
  "I'm sorry, I couldn't produce an answer from this report right now. Please try again shortly.";

pub struct ChatEngine<B: Backends> {
  repository: Repository<B>,
  llm:        Arc<B::Llm>,
  config:     ChatConfig,
}

impl<B: Backends> Clone for ChatEngine<B> {
  fn clone(&self) -> Self {
    Self {
      repository: self.repository.clone(),
      llm:        Arc::clone(&self.llm),
      config:     self.config.clone(),
    }
  }
}

impl<B: Backends> ChatEngine<B> {
  pub fn new(repository: Repository<B>, llm: Arc<B::Llm>, config: ChatConfig) -> Self {
    Self { repository, llm, config }
  }

  /// Answer `text` about report `report_id` and append both turns to the
  /// transcript. Returns the assistant message.
  ///
  /// A failed model call yields an apologetic answer rather than an error.
  pub async fn ask(&self, report_id: Uuid, text: &str) -> Result<ChatMessage, ChatError> {
    if !message_in_bounds(text) {
      return Err(ChatError::InvalidMessage(format!(
        "message must be between 1 and {MAX_MESSAGE_CHARS} characters"
      )));
    }
    let question = text.trim();

    let lock = self.repository.lock_for(report_id);
    let _guard = lock.lock().await;

    let report = self.committed_report(report_id).await?;
    let history = self.repository.history(report_id).await?;
    let window = &history[history.len().saturating_sub(self.config.history_window)..];

    let passages = self
      .repository
      .retrieve(&report, question, self.config.report_passages, self.config.source_passages)
      .await?;
    let prompt_passages: Vec<PromptPassage<'_>> = passages
      .iter()
      .map(|p| PromptPassage { origin: &p.origin, text: &p.text })
      .collect();

    let request = CompletionRequest::new(
      CHAT_SYSTEM,
      chat_prompt(&report.company_name, &prompt_passages, window, question),
    )
    .with_max_tokens(self.config.max_tokens);

    let timeout = Duration::from_secs(self.config.timeout_secs);
    let (answer, sources) = match with_timeout(timeout, self.llm.complete(&request)).await {
      Ok(answer) => {
        let mut sources: Vec<String> = Vec::new();
        for p in &passages {
          if !sources.contains(&p.origin) {
            sources.push(p.origin.clone());
          }
        }
        (answer.trim().to_string(), sources)
      }
      Err(e) => {
        tracing::warn!(%report_id, error = %e, "chat generation failed; answering degraded");
        (DEGRADED_ANSWER.to_string(), Vec::new())
      }
    };

    let user = ChatMessage::user(report_id, question);
    let assistant = ChatMessage::assistant(report_id, answer, sources);
    self
      .repository
      .append_messages(&[user, assistant.clone()])
      .await?;

    tracing::info!(%report_id, passages = passages.len(), "chat answered");
    Ok(assistant)
  }

  pub async fn history(&self, report_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
    self.committed_report(report_id).await?;
    Ok(self.repository.history(report_id).await?)
  }

  /// Drop the transcript for `report_id`. Returns the number of messages
  /// removed.
  pub async fn clear_history(&self, report_id: Uuid) -> Result<usize, ChatError> {
    let lock = self.repository.lock_for(report_id);
    let _guard = lock.lock().await;
    self.committed_report(report_id).await?;
    Ok(self.repository.clear_history(report_id).await?)
  }

  /// Up to five follow-up questions derived from the report's key
  /// takeaways. Independent of the conversation.
  pub async fn suggest(&self, report_id: Uuid) -> Result<Vec<String>, ChatError> {
    let report = self.committed_report(report_id).await?;
    let takeaways = report.key_takeaways();
    if takeaways.is_empty() {
      return Ok(defaults());
    }

    let request =
      CompletionRequest::new(SUGGEST_SYSTEM, suggestion_prompt(&report.company_name, takeaways))
        .with_max_tokens(500);
    let timeout = Duration::from_secs(self.config.timeout_secs);
    let reply = match with_timeout(timeout, self.llm.complete(&request)).await {
      Ok(reply) => reply,
      Err(e) => {
        tracing::warn!(%report_id, error = %e, "suggestion generation failed");
        return Ok(defaults());
      }
    };

    let questions: Vec<String> = match parse_reply::<Vec<String>>(&reply) {
      Ok(qs) => qs
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .take(MAX_SUGGESTIONS)
        .collect(),
      Err(e) => {
        tracing::warn!(%report_id, error = %e, "unparseable suggestions");
        Vec::new()
      }
    };
    Ok(if questions.is_empty() { defaults() } else { questions })
  }

  async fn committed_report(&self, report_id: Uuid) -> Result<Report, ChatError> {
    let report = self
      .repository
      .get(report_id)
      .await?
      .ok_or(ChatError::NotFound(report_id))?;
    if !report.status.is_committed() {
      return Err(ChatError::NotReady { id: report_id, status: report.status });
    }
    Ok(report)
  }
}

fn defaults() -> Vec<String> {
  DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect()
}
