//! The lexroute orchestration core.
//!
//! Bottom-up:
//!
//! - [`gateway`]: evidence gathering over a [`WebSearch`] capability.
//! - [`generation`] / [`validation`]: one text-generation call each, turning
//!   a profile plus evidence into a draft and a draft into a verdict.
//! - [`repository`]: the dual write to the record store and semantic index.
//! - [`orchestrator`]: the bounded generate/validate loop.
//! - [`chat`]: retrieval-grounded questions about one committed report.
//!
//! Capabilities are injected through the [`Backends`] bundle; nothing here
//! reaches for a global client.
//!
//! [`WebSearch`]: lexroute_core::capability::WebSearch

#![allow(async_fn_in_trait)]

pub mod backends;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod generation;
pub mod orchestrator;
pub mod repository;
pub mod retry;
pub mod validation;

mod json;
mod prompt;

#[cfg(any(test, feature = "fakes"))]
pub mod fakes;

pub use backends::{Backends, Repository};
pub use chat::ChatEngine;
pub use config::{ChatConfig, GatewayConfig, PipelineConfig, RetentionPolicy};
pub use embedding::HashingEmbedder;
pub use error::{ChatError, GenerationError, PersistenceError, PipelineError, ValidationError};
pub use gateway::EvidenceGateway;
pub use generation::GenerationService;
pub use orchestrator::{GenerationOutcome, Orchestrator, PipelineState};
pub use repository::ReportRepository;
pub use validation::ValidationService;

#[cfg(test)]
mod tests;
