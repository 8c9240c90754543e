//! [`SqliteStore`]: the SQLite implementation of [`ReportStore`] and
//! [`ChatStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use lexroute_core::{
  chat::ChatMessage,
  report::{Report, ReportStatus, StatusCounts},
  store::{ChatStore, ReportStore},
};

use crate::{
  encode::{decode_uuid, encode_dt, encode_uuid, RawChatMessage, RawReport},
  schema::STORE_SCHEMA,
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Record store and chat transcripts backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  async fn upsert_report(&self, report: &Report) -> Result<()> {
    let id_str       = encode_uuid(report.id);
    let company      = report.company_name.clone();
    let status_str   = report.status.to_string();
    let generated_at = encode_dt(report.generated_at);
    let json         = serde_json::to_string(report)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reports (report_id, company_name, status, generated_at, report_json)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(report_id) DO UPDATE SET
             company_name = excluded.company_name,
             status       = excluded.status,
             generated_at = excluded.generated_at,
             report_json  = excluded.report_json",
          rusqlite::params![id_str, company, status_str, generated_at, json],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(report_id = %report.id, status = %report.status, "report upserted");
    Ok(())
  }

  async fn replace_report(&self, report: &Report) -> Result<bool> {
    let id_str       = encode_uuid(report.id);
    let status_str   = report.status.to_string();
    let generated_at = encode_dt(report.generated_at);
    let json         = serde_json::to_string(report)?;

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE reports
           SET status = ?2, generated_at = ?3, report_json = ?4
           WHERE report_id = ?1",
          rusqlite::params![id_str, status_str, generated_at, json],
        )?)
      })
      .await?;

    Ok(n > 0)
  }

  async fn get_report(&self, id: Uuid) -> Result<Option<Report>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawReport> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT report_json FROM reports WHERE report_id = ?1",
              rusqlite::params![id_str],
              |row| Ok(RawReport { report_json: row.get(0)? }),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawReport::into_report).transpose()
  }

  async fn list_reports(&self, limit: usize, offset: usize) -> Result<Vec<Report>> {
    let limit_val  = limit as i64;
    let offset_val = offset as i64;

    let raws: Vec<RawReport> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT report_json FROM reports
           ORDER BY generated_at DESC, report_id
           LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val, offset_val], |row| {
            Ok(RawReport { report_json: row.get(0)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReport::into_report).collect()
  }

  async fn delete_report(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);

    let removed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM reports WHERE report_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(n > 0)
      })
      .await?;

    Ok(removed)
  }

  async fn report_ids(&self, status: Option<ReportStatus>) -> Result<Vec<Uuid>> {
    let status_str = status.map(|s| s.to_string());

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT report_id FROM reports
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY generated_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn count_by_status(&self) -> Result<StatusCounts> {
    let rows: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT status, COUNT(*) FROM reports GROUP BY status")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
      let n = n as usize;
      match status.parse::<ReportStatus>() {
        Ok(ReportStatus::Pending) => counts.pending = n,
        Ok(ReportStatus::Approved) => counts.approved = n,
        Ok(ReportStatus::Failed) => counts.failed = n,
        Err(_) => {
          return Err(Error::UnknownVariant { field: "status", value: status });
        }
      }
    }
    Ok(counts)
  }
}

// ─── ChatStore impl ──────────────────────────────────────────────────────────

impl ChatStore for SqliteStore {
  type Error = Error;

  async fn append_messages(&self, messages: &[ChatMessage]) -> Result<()> {
    let rows = messages
      .iter()
      .map(|m| {
        Ok((
          encode_uuid(m.id),
          encode_uuid(m.report_id),
          m.role.to_string(),
          m.content.clone(),
          serde_json::to_string(&m.sources)?,
          encode_dt(m.created_at),
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO chat_messages
               (message_id, report_id, role, content, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for (id, report_id, role, content, sources, created_at) in &rows {
            stmt.execute(rusqlite::params![id, report_id, role, content, sources, created_at])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn history(&self, report_id: Uuid) -> Result<Vec<ChatMessage>> {
    let id_str = encode_uuid(report_id);

    let raws: Vec<RawChatMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT message_id, report_id, role, content, sources, created_at
           FROM chat_messages
           WHERE report_id = ?1
           ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawChatMessage {
              message_id: row.get(0)?,
              report_id:  row.get(1)?,
              role:       row.get(2)?,
              content:    row.get(3)?,
              sources:    row.get(4)?,
              created_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChatMessage::into_message).collect()
  }

  async fn clear_history(&self, report_id: Uuid) -> Result<usize> {
    let id_str = encode_uuid(report_id);

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM chat_messages WHERE report_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(n)
  }
}
