//! The capability bundle every pipeline service is generic over.
//!
//! A binary picks concrete types once (HTTP clients, SQLite stores); tests
//! pick deterministic fakes. Services receive `Arc` handles at construction.

use lexroute_core::{
  capability::{Embedder, TextGenerator, WebSearch},
  store::{ChatStore, ReportStore, SemanticIndex},
};

use crate::repository::ReportRepository;

pub trait Backends: Send + Sync + 'static {
  /// Authoritative report records plus chat transcripts.
  type Store: ReportStore + ChatStore + 'static;
  type Index: SemanticIndex + 'static;
  type Search: WebSearch + 'static;
  type Llm: TextGenerator + 'static;
  type Embed: Embedder + 'static;
}

/// The repository type for a backend bundle.
pub type Repository<B> = ReportRepository<
  <B as Backends>::Store,
  <B as Backends>::Index,
  <B as Backends>::Embed,
>;
