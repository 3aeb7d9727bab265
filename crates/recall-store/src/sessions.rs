//! Session lifecycle: start, end, targeted metadata updates, orphan recovery.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, instrument};

use recall_core::ids::{ConversationId, SessionId};

use crate::archive::ArchiveStore;
use crate::error::StoreError;
use crate::row_helpers::{fmt_ts, get, get_opt, get_ts, get_ts_opt, parse_enum, parse_json};
use crate::types::{EndReason, Session, SessionMetadata};

pub(crate) const SESSION_COLUMNS: &str = "id, conversation_id, started_at, ended_at, end_reason, \
     message_count, title, summary, tags, metadata, carry_forward";

pub(crate) fn session_from_row(row: &rusqlite::Row<'_>) -> Result<Session, StoreError> {
    const TABLE: &str = "sessions";
    let end_reason: Option<String> = get_opt(row, 4, TABLE, "end_reason")?;
    let tags: String = get(row, 8, TABLE, "tags")?;
    let metadata: Option<String> = get_opt(row, 9, TABLE, "metadata")?;
    let message_count: i64 = get(row, 5, TABLE, "message_count")?;

    Ok(Session {
        id: SessionId::from_raw(get::<String>(row, 0, TABLE, "id")?),
        conversation_id: ConversationId::from_raw(get::<String>(row, 1, TABLE, "conversation_id")?),
        started_at: get_ts(row, 2, TABLE, "started_at")?,
        ended_at: get_ts_opt(row, 3, TABLE, "ended_at")?,
        end_reason: end_reason
            .map(|r| parse_enum(&r, TABLE, "end_reason"))
            .transpose()?,
        message_count: u32::try_from(message_count.max(0)).unwrap_or(u32::MAX),
        title: get(row, 6, TABLE, "title")?,
        summary: get(row, 7, TABLE, "summary")?,
        tags: parse_json(&tags, TABLE, "tags")?,
        metadata: metadata
            .map(|m| parse_json::<SessionMetadata>(&m, TABLE, "metadata"))
            .transpose()?,
        carry_forward: get_opt(row, 10, TABLE, "carry_forward")?,
    })
}

pub(crate) fn query_sessions<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Session>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(session_from_row(row)?);
    }
    Ok(out)
}

pub(crate) fn session_exists(conn: &Connection, id: &SessionId) -> Result<bool, StoreError> {
    Ok(conn
        .query_row("SELECT 1 FROM sessions WHERE id = ?1", [id.as_str()], |_| Ok(()))
        .optional()?
        .is_some())
}

pub(crate) fn insert_session(
    conn: &Connection,
    id: &SessionId,
    conversation_id: &ConversationId,
    started_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO sessions (id, conversation_id, started_at) VALUES (?1, ?2, ?3)",
        params![id.as_str(), conversation_id.as_str(), fmt_ts(&started_at)],
    )?;
    Ok(())
}

pub(crate) fn close_session(
    conn: &Connection,
    id: &SessionId,
    reason: EndReason,
    ended_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE sessions
         SET ended_at = MAX(?1, started_at), end_reason = ?2
         WHERE id = ?3 AND ended_at IS NULL",
        params![fmt_ts(&ended_at), reason.as_str(), id.as_str()],
    )?;
    if changed == 0 && !session_exists(conn, id)? {
        return Err(StoreError::NotFound(format!("session {id}")));
    }
    Ok(())
}

fn require_updated(changed: usize, id: &SessionId) -> Result<(), StoreError> {
    if changed == 0 {
        return Err(StoreError::NotFound(format!("session {id}")));
    }
    Ok(())
}

impl ArchiveStore {
    /// Open a new session starting now.
    pub fn start_session(&self, conversation_id: &ConversationId) -> Result<Session, StoreError> {
        self.start_session_at(conversation_id, self.now())
    }

    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    pub fn start_session_at(
        &self,
        conversation_id: &ConversationId,
        started_at: DateTime<Utc>,
    ) -> Result<Session, StoreError> {
        let id = SessionId::new();
        self.db
            .with_conn(|conn| insert_session(conn, &id, conversation_id, started_at))?;
        debug!(session_id = %id, "session started");

        Ok(Session {
            id,
            conversation_id: conversation_id.clone(),
            started_at,
            ended_at: None,
            end_reason: None,
            message_count: 0,
            title: String::new(),
            summary: String::new(),
            tags: Vec::new(),
            metadata: None,
            carry_forward: None,
        })
    }

    pub fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.db.with_conn(|conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            query_sessions(conn, &sql, [id.as_str()])?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::NotFound(format!("session {id}")))
        })
    }

    /// Close a session now. See [`Self::end_session_at`].
    pub fn end_session(&self, id: &SessionId, reason: EndReason) -> Result<(), StoreError> {
        self.end_session_at(id, reason, self.now())
    }

    /// Close a session once. A second close is a no-op that keeps the first
    /// ended-at and reason. The stored ended-at is never earlier than the
    /// session start.
    #[instrument(skip(self), fields(session_id = %id, reason = %reason))]
    pub fn end_session_at(
        &self,
        id: &SessionId,
        reason: EndReason,
        ended_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| close_session(conn, id, reason, ended_at))
    }

    /// Newest-first by started-at. `None` lists across all conversations.
    pub fn list_sessions(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| match conversation_id.filter(|c| !c.is_empty()) {
            Some(conv) => query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE conversation_id = ?1
                     ORDER BY started_at DESC, id DESC LIMIT ?2"
                ),
                params![conv.as_str(), limit],
            ),
            None => query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     ORDER BY started_at DESC, id DESC LIMIT ?1"
                ),
                params![limit],
            ),
        })
    }

    /// Write summarizer output. Rewriting the same values is harmless.
    #[instrument(skip(self, metadata, tags), fields(session_id = %id))]
    pub fn set_session_metadata(
        &self,
        id: &SessionId,
        metadata: &SessionMetadata,
        title: &str,
        tags: &[String],
    ) -> Result<(), StoreError> {
        let meta_json = serde_json::to_string(metadata)?;
        let tags_json = serde_json::to_string(tags)?;
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET metadata = ?1, title = ?2, tags = ?3 WHERE id = ?4",
                params![meta_json, title, tags_json, id.as_str()],
            )?;
            require_updated(changed, id)
        })
    }

    pub fn set_session_summary(&self, id: &SessionId, summary: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET summary = ?1 WHERE id = ?2",
                params![summary, id.as_str()],
            )?;
            require_updated(changed, id)
        })
    }

    pub fn set_session_message_count(&self, id: &SessionId, count: u32) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET message_count = ?1 WHERE id = ?2",
                params![count, id.as_str()],
            )?;
            require_updated(changed, id)
        })
    }

    /// Closed sessions without metadata that hold at least one non-system
    /// message, newest first. The message check is an existence query so a
    /// stale `message_count` never qualifies a session.
    pub fn unsummarized_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions s
                     WHERE s.ended_at IS NOT NULL
                       AND s.metadata IS NULL
                       AND EXISTS (
                           SELECT 1 FROM archived_messages m
                           WHERE m.session_id = s.id AND m.role != 'system'
                       )
                     ORDER BY s.started_at DESC LIMIT ?1"
                ),
                params![limit],
            )
        })
    }

    /// Close every open session that started before `cutoff` with reason
    /// `crash_recovery`. Returns the number closed.
    #[instrument(skip(self))]
    pub fn close_orphaned_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let now = fmt_ts(&self.now());
        let closed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE sessions
                 SET ended_at = MAX(?1, started_at), end_reason = ?2
                 WHERE ended_at IS NULL AND started_at < ?3",
                params![now, EndReason::CrashRecovery.as_str(), fmt_ts(&cutoff)],
            )?)
        })?;
        if closed > 0 {
            info!(closed, "closed orphaned sessions");
        }
        Ok(closed)
    }

    /// Attach a handoff note to a session. An empty note clears it.
    pub fn set_carry_forward(&self, id: &SessionId, note: &str) -> Result<(), StoreError> {
        let note = note.trim();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET carry_forward = ?1 WHERE id = ?2",
                params![(!note.is_empty()).then_some(note), id.as_str()],
            )?;
            require_updated(changed, id)
        })
    }

    /// Note from the newest closed session of the conversation, if that
    /// session carries one.
    pub fn latest_carry_forward(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<(SessionId, String)>, StoreError> {
        self.db.with_conn(|conn| {
            let row: Option<(String, Option<String>)> = conn
                .query_row(
                    "SELECT id, carry_forward FROM sessions
                     WHERE conversation_id = ?1 AND ended_at IS NOT NULL
                     ORDER BY ended_at DESC, started_at DESC LIMIT 1",
                    [conversation_id.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            Ok(row.and_then(|(id, note)| note.map(|n| (SessionId::from_raw(id), n))))
        })
    }
}
