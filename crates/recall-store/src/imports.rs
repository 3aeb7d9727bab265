//! Foreign-id to session mapping that makes bulk imports idempotent.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, instrument};

use recall_core::ids::{ConversationId, SessionId};

use crate::archive::ArchiveStore;
use crate::error::StoreError;
use crate::messages::{insert_messages, upsert_tool_calls, validate_tool_calls};
use crate::row_helpers::fmt_ts;
use crate::sessions::{close_session, insert_session};
use crate::types::{ArchivedMessage, ArchivedToolCall, EndReason};

/// A foreign transcript ready to be written as one closed session.
#[derive(Clone, Debug)]
pub struct SessionImport {
    pub foreign_id: String,
    pub source_type: String,
    pub session_id: SessionId,
    pub conversation_id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub messages: Vec<ArchivedMessage>,
    pub tool_calls: Vec<ArchivedToolCall>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportedCounts {
    pub messages: usize,
    pub tool_calls: usize,
}

fn lookup_import(
    conn: &Connection,
    foreign_id: &str,
    source_type: &str,
) -> Result<Option<SessionId>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT session_id FROM imports WHERE foreign_id = ?1 AND source_type = ?2",
            params![foreign_id, source_type],
            |r| r.get::<_, String>(0),
        )
        .optional()?
        .map(SessionId::from_raw))
}

fn upsert_import(
    conn: &Connection,
    foreign_id: &str,
    source_type: &str,
    session_id: &SessionId,
    imported_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO imports (foreign_id, source_type, session_id, imported_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (foreign_id, source_type) DO UPDATE SET
             session_id = excluded.session_id,
             imported_at = excluded.imported_at",
        params![foreign_id, source_type, session_id.as_str(), fmt_ts(&imported_at)],
    )?;
    Ok(())
}

impl ArchiveStore {
    pub fn is_imported(&self, foreign_id: &str, source_type: &str) -> Result<bool, StoreError> {
        Ok(self.imported_session(foreign_id, source_type)?.is_some())
    }

    /// Local session created for a foreign id, if any.
    pub fn imported_session(
        &self,
        foreign_id: &str,
        source_type: &str,
    ) -> Result<Option<SessionId>, StoreError> {
        self.db
            .with_conn(|conn| lookup_import(conn, foreign_id, source_type))
    }

    /// Record that `foreign_id` was imported as `session_id`. Re-recording
    /// points the mapping at the newer session.
    pub fn record_import(
        &self,
        foreign_id: &str,
        source_type: &str,
        session_id: &SessionId,
    ) -> Result<(), StoreError> {
        let now = self.now();
        self.db
            .with_conn(|conn| upsert_import(conn, foreign_id, source_type, session_id, now))
    }

    /// Write a foreign transcript as a closed session in one transaction:
    /// the session row, its messages and tool calls, the close and the
    /// import mapping. Any failure leaves nothing behind. Returns `None`
    /// without writing when the foreign id is already mapped.
    #[instrument(skip(self, import), fields(foreign_id = %import.foreign_id, session_id = %import.session_id))]
    pub fn import_session(
        &self,
        import: &SessionImport,
    ) -> Result<Option<ImportedCounts>, StoreError> {
        validate_tool_calls(&import.tool_calls)?;
        let now = self.now();
        self.db.with_tx(|conn| {
            if lookup_import(conn, &import.foreign_id, &import.source_type)?.is_some() {
                return Ok(None);
            }
            insert_session(conn, &import.session_id, &import.conversation_id, import.started_at)?;
            let messages = insert_messages(conn, &import.messages)?;
            let tool_calls = upsert_tool_calls(conn, &import.tool_calls)?;
            close_session(conn, &import.session_id, EndReason::Import, import.ended_at)?;
            upsert_import(
                conn,
                &import.foreign_id,
                &import.source_type,
                &import.session_id,
                now,
            )?;
            Ok(Some(ImportedCounts {
                messages,
                tool_calls,
            }))
        })
    }

    /// Delete every session imported from `source_type`, with its messages,
    /// tool calls and import rows. Returns the number of sessions removed.
    #[instrument(skip(self))]
    pub fn purge_imported(&self, source_type: &str) -> Result<usize, StoreError> {
        let purged = self.db.with_tx(|conn| {
            const SESSIONS: &str =
                "SELECT session_id FROM imports WHERE source_type = ?1";
            conn.execute(
                &format!("DELETE FROM archived_messages WHERE session_id IN ({SESSIONS})"),
                [source_type],
            )?;
            conn.execute(
                &format!("DELETE FROM archived_tool_calls WHERE session_id IN ({SESSIONS})"),
                [source_type],
            )?;
            let sessions = conn.execute(
                &format!("DELETE FROM sessions WHERE id IN ({SESSIONS})"),
                [source_type],
            )?;
            conn.execute("DELETE FROM imports WHERE source_type = ?1", [source_type])?;
            Ok(sessions)
        })?;
        info!(purged, "purged imported sessions");
        Ok(purged)
    }
}
