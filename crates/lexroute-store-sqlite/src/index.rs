//! [`SqliteIndex`]: a brute-force vector index over SQLite.
//!
//! Embeddings are stored as blobs and scored in Rust with cosine distance.
//! Adequate for the few thousand entries a single company accumulates.

use std::path::Path;

use uuid::Uuid;

use lexroute_core::store::{
  cosine_distance, EntryKind, IndexEntry, IndexHit, IndexQuery, SemanticIndex,
};

use crate::{
  encode::{decode_uuid, encode_embedding, encode_uuid, RawIndexEntry},
  schema::INDEX_SCHEMA,
  Error, Result,
};

#[derive(Clone)]
pub struct SqliteIndex {
  conn: tokio_rusqlite::Connection,
}

impl SqliteIndex {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let index = Self { conn };
    index.init_schema().await?;
    Ok(index)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let index = Self { conn };
    index.init_schema().await?;
    Ok(index)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(INDEX_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl SemanticIndex for SqliteIndex {
  type Error = Error;

  async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
    let rows = entries
      .iter()
      .map(|e| {
        Ok((
          e.id.clone(),
          encode_uuid(e.report_id),
          e.kind.to_string(),
          e.text.clone(),
          encode_embedding(&e.embedding),
          serde_json::to_string(&e.metadata)?,
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO index_entries
               (entry_id, report_id, kind, body, embedding, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(entry_id) DO UPDATE SET
               report_id     = excluded.report_id,
               kind          = excluded.kind,
               body          = excluded.body,
               embedding     = excluded.embedding,
               metadata_json = excluded.metadata_json",
          )?;
          for (id, report_id, kind, body, embedding, metadata) in &rows {
            stmt.execute(rusqlite::params![id, report_id, kind, body, embedding, metadata])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(())
  }

  async fn query(&self, query: &IndexQuery) -> Result<Vec<IndexHit>> {
    if query.limit == 0 {
      return Ok(Vec::new());
    }
    let kind_str   = query.kind.map(|k| k.to_string());
    let report_str = query.report_id.map(encode_uuid);

    let raws: Vec<RawIndexEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry_id, report_id, kind, body, embedding, metadata_json
           FROM index_entries
           WHERE (?1 IS NULL OR kind = ?1)
             AND (?2 IS NULL OR report_id = ?2)",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str, report_str], |row| {
            Ok(RawIndexEntry {
              entry_id:      row.get(0)?,
              report_id:     row.get(1)?,
              kind:          row.get(2)?,
              body:          row.get(3)?,
              embedding:     row.get(4)?,
              metadata_json: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut hits = Vec::with_capacity(raws.len());
    for raw in raws {
      let entry = raw.into_entry()?;
      // Left behind by an embedder change; repair re-embeds these.
      if entry.embedding.len() != query.embedding.len() {
        tracing::warn!(
          entry_id = %entry.id,
          stored = entry.embedding.len(),
          query = query.embedding.len(),
          "skipping index entry with stale dimensions"
        );
        continue;
      }
      let distance = cosine_distance(&query.embedding, &entry.embedding);
      hits.push(IndexHit { entry, distance });
    }

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.entry.id.cmp(&b.entry.id)));
    hits.truncate(query.limit);
    Ok(hits)
  }

  async fn delete_report(&self, report_id: Uuid) -> Result<usize> {
    let id_str = encode_uuid(report_id);
    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM index_entries WHERE report_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(n)
  }

  async fn indexed_report_ids(&self, kind: EntryKind) -> Result<Vec<Uuid>> {
    let kind_str = kind.to_string();
    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT report_id FROM index_entries WHERE kind = ?1 ORDER BY report_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn stale_report_ids(&self, dimensions: usize) -> Result<Vec<Uuid>> {
    let bytes = (dimensions * 4) as i64;
    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT report_id FROM index_entries
           WHERE length(embedding) != ?1
           ORDER BY report_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![bytes], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn count(&self, kind: Option<EntryKind>) -> Result<usize> {
    let kind_str = kind.map(|k| k.to_string());
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM index_entries WHERE (?1 IS NULL OR kind = ?1)",
          rusqlite::params![kind_str],
          |row| row.get(0),
        )?)
      })
      .await?;
    Ok(n as usize)
  }
}
