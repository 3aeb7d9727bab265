//! Per-conversation temp label to file path mapping.
//!
//! Only rows live here; the files themselves are owned by the engine's
//! temp file store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use recall_core::ids::ConversationId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{fmt_ts, get, get_ts};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TempFileRecord {
    pub conversation_id: ConversationId,
    pub label: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<TempFileRecord, StoreError> {
    const TABLE: &str = "temp_files";
    Ok(TempFileRecord {
        conversation_id: ConversationId::from_raw(get::<String>(row, 0, TABLE, "conversation_id")?),
        label: get(row, 1, TABLE, "label")?,
        path: PathBuf::from(get::<String>(row, 2, TABLE, "path")?),
        created_at: get_ts(row, 3, TABLE, "created_at")?,
    })
}

#[derive(Clone)]
pub struct TempFileRepo {
    db: Database,
}

impl TempFileRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace the mapping. Returns the previous path, if any.
    pub fn upsert(&self, record: &TempFileRecord) -> Result<Option<PathBuf>, StoreError> {
        let path = record
            .path
            .to_str()
            .ok_or_else(|| StoreError::Invalid(format!("non-UTF-8 path {:?}", record.path)))?
            .to_owned();
        self.db.with_tx(|conn| {
            let previous: Option<String> = conn
                .query_row(
                    "SELECT path FROM temp_files WHERE conversation_id = ?1 AND label = ?2",
                    params![record.conversation_id.as_str(), record.label],
                    |r| r.get(0),
                )
                .optional()?;
            conn.execute(
                "INSERT INTO temp_files (conversation_id, label, path, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (conversation_id, label) DO UPDATE SET
                     path = excluded.path,
                     created_at = excluded.created_at",
                params![
                    record.conversation_id.as_str(),
                    record.label,
                    path,
                    fmt_ts(&record.created_at)
                ],
            )?;
            Ok(previous.map(PathBuf::from))
        })
    }

    pub fn get(
        &self,
        conversation_id: &ConversationId,
        label: &str,
    ) -> Result<Option<TempFileRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, label, path, created_at FROM temp_files
                 WHERE conversation_id = ?1 AND label = ?2",
            )?;
            let mut rows = stmt.query(params![conversation_id.as_str(), label])?;
            match rows.next()? {
                Some(row) => Ok(Some(record_from_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Mappings of a conversation ordered by label.
    pub fn list(&self, conversation_id: &ConversationId) -> Result<Vec<TempFileRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, label, path, created_at FROM temp_files
                 WHERE conversation_id = ?1 ORDER BY label",
            )?;
            let mut rows = stmt.query([conversation_id.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(record_from_row(row)?);
            }
            Ok(out)
        })
    }

    /// Remove one mapping. Returns whether it existed.
    pub fn delete(&self, conversation_id: &ConversationId, label: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM temp_files WHERE conversation_id = ?1 AND label = ?2",
                params![conversation_id.as_str(), label],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_all(&self, conversation_id: &ConversationId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM temp_files WHERE conversation_id = ?1",
                [conversation_id.as_str()],
            )?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(conv: &str, label: &str, path: &str) -> TempFileRecord {
        TempFileRecord {
            conversation_id: ConversationId::from_raw(conv),
            label: label.into(),
            path: PathBuf::from(path),
            created_at: Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn upsert_returns_previous_path() {
        let repo = TempFileRepo::new(Database::in_memory().unwrap());
        assert_eq!(repo.upsert(&record("c", "draft", "/tmp/a.md")).unwrap(), None);
        assert_eq!(
            repo.upsert(&record("c", "draft", "/tmp/b.md")).unwrap(),
            Some(PathBuf::from("/tmp/a.md"))
        );
        let got = repo.get(&ConversationId::from_raw("c"), "draft").unwrap().unwrap();
        assert_eq!(got.path, PathBuf::from("/tmp/b.md"));
    }

    #[test]
    fn list_and_delete_are_scoped_by_conversation() {
        let repo = TempFileRepo::new(Database::in_memory().unwrap());
        repo.upsert(&record("c", "b", "/tmp/1")).unwrap();
        repo.upsert(&record("c", "a", "/tmp/2")).unwrap();
        repo.upsert(&record("other", "a", "/tmp/3")).unwrap();

        let c = ConversationId::from_raw("c");
        let labels: Vec<_> = repo.list(&c).unwrap().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["a", "b"]);

        assert!(repo.delete(&c, "a").unwrap());
        assert!(!repo.delete(&c, "a").unwrap());
        assert_eq!(repo.delete_all(&c).unwrap(), 1);
        assert!(repo.list(&c).unwrap().is_empty());
        assert_eq!(repo.list(&ConversationId::from_raw("other")).unwrap().len(), 1);
    }
}
