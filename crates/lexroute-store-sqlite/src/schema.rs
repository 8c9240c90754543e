//! SQL schemas for the record store and the semantic index.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Record store DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const STORE_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per report aggregate. The full aggregate lives in report_json;
-- the other columns are copies used for ordering and filtering.
CREATE TABLE IF NOT EXISTS reports (
    report_id     TEXT PRIMARY KEY,
    company_name  TEXT NOT NULL,
    status        TEXT NOT NULL,   -- 'pending' | 'approved' | 'failed'
    generated_at  TEXT NOT NULL,   -- ISO 8601 UTC
    report_json   TEXT NOT NULL
);

-- Chat transcripts are append-only; rows are only removed wholesale per
-- report (clear or delete).
CREATE TABLE IF NOT EXISTS chat_messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id   TEXT NOT NULL UNIQUE,
    report_id    TEXT NOT NULL,
    role         TEXT NOT NULL,   -- 'user' | 'assistant'
    content      TEXT NOT NULL,
    sources      TEXT NOT NULL DEFAULT '[]',
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS reports_generated_idx ON reports(generated_at);
CREATE INDEX IF NOT EXISTS reports_status_idx    ON reports(status);
CREATE INDEX IF NOT EXISTS chat_report_idx       ON chat_messages(report_id, seq);

PRAGMA user_version = 1;
";

/// Semantic index DDL.
pub const INDEX_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS index_entries (
    entry_id       TEXT PRIMARY KEY,
    report_id      TEXT NOT NULL,
    kind           TEXT NOT NULL,   -- 'report' | 'source'
    body           TEXT NOT NULL,
    embedding      BLOB NOT NULL,   -- little-endian f32 array
    metadata_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS entries_report_idx ON index_entries(report_id);
CREATE INDEX IF NOT EXISTS entries_kind_idx   ON index_entries(kind);

PRAGMA user_version = 1;
";
