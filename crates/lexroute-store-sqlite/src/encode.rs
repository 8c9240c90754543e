//! Encoding and decoding helpers between domain types and the plain-text or
//! blob representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings,
//! embeddings little-endian `f32` blobs. Aggregates are compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use lexroute_core::{
  chat::{ChatMessage, ChatRole},
  report::Report,
  store::{EntryKind, IndexEntry},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that lexical order in SQL matches chronological order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_role(s: &str) -> Result<ChatRole> {
  s.parse().map_err(|_| Error::UnknownVariant { field: "role", value: s.into() })
}

pub fn decode_kind(s: &str) -> Result<EntryKind> {
  s.parse().map_err(|_| Error::UnknownVariant { field: "kind", value: s.into() })
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
  if bytes.len() % 4 != 0 {
    return Err(Error::CorruptEmbedding(bytes.len()));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

// ─── Raw rows ────────────────────────────────────────────────────────────────

/// Row of the `reports` table; only the JSON column is needed to rebuild the
/// aggregate.
pub struct RawReport {
  pub report_json: String,
}

impl RawReport {
  pub fn into_report(self) -> Result<Report> {
    Ok(serde_json::from_str(&self.report_json)?)
  }
}

/// Raw strings read directly from a `chat_messages` row.
pub struct RawChatMessage {
  pub message_id: String,
  pub report_id:  String,
  pub role:       String,
  pub content:    String,
  pub sources:    String,
  pub created_at: String,
}

impl RawChatMessage {
  pub fn into_message(self) -> Result<ChatMessage> {
    Ok(ChatMessage {
      id:         decode_uuid(&self.message_id)?,
      report_id:  decode_uuid(&self.report_id)?,
      role:       decode_role(&self.role)?,
      content:    self.content,
      sources:    serde_json::from_str(&self.sources)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `index_entries` row.
pub struct RawIndexEntry {
  pub entry_id:      String,
  pub report_id:     String,
  pub kind:          String,
  pub body:          String,
  pub embedding:     Vec<u8>,
  pub metadata_json: String,
}

impl RawIndexEntry {
  pub fn into_entry(self) -> Result<IndexEntry> {
    Ok(IndexEntry {
      id:        self.entry_id,
      report_id: decode_uuid(&self.report_id)?,
      kind:      decode_kind(&self.kind)?,
      text:      self.body,
      embedding: decode_embedding(&self.embedding)?,
      metadata:  serde_json::from_str(&self.metadata_json)?,
    })
  }
}
