//! Append-only message and tool-call storage.

use rusqlite::{params, Connection};
use tracing::{debug, instrument};

use recall_core::ids::{ConversationId, MessageId, SessionId, ToolCallId};

use crate::archive::ArchiveStore;
use crate::error::StoreError;
use crate::row_helpers::{fmt_ts, get, get_opt, get_ts, get_ts_opt, parse_enum};
use crate::types::{ArchivedMessage, ArchivedToolCall};

pub(crate) const MESSAGE_COLUMNS: &str = "id, session_id, conversation_id, role, content, \
     timestamp, token_count, tool_call_id, archive_reason";

pub(crate) fn message_from_row(row: &rusqlite::Row<'_>) -> Result<ArchivedMessage, StoreError> {
    const TABLE: &str = "archived_messages";
    let role: String = get(row, 3, TABLE, "role")?;
    let tokens: i64 = get(row, 6, TABLE, "token_count")?;
    Ok(ArchivedMessage {
        id: MessageId::from_raw(get::<String>(row, 0, TABLE, "id")?),
        session_id: SessionId::from_raw(get::<String>(row, 1, TABLE, "session_id")?),
        conversation_id: ConversationId::from_raw(get::<String>(row, 2, TABLE, "conversation_id")?),
        role: parse_enum(&role, TABLE, "role")?,
        content: get(row, 4, TABLE, "content")?,
        timestamp: get_ts(row, 5, TABLE, "timestamp")?,
        token_count: u32::try_from(tokens.max(0)).unwrap_or(u32::MAX),
        tool_call_id: get_opt::<String>(row, 7, TABLE, "tool_call_id")?.map(ToolCallId::from_raw),
        archive_reason: get(row, 8, TABLE, "archive_reason")?,
    })
}

fn tool_call_from_row(row: &rusqlite::Row<'_>) -> Result<ArchivedToolCall, StoreError> {
    const TABLE: &str = "archived_tool_calls";
    Ok(ArchivedToolCall {
        id: ToolCallId::from_raw(get::<String>(row, 0, TABLE, "id")?),
        session_id: SessionId::from_raw(get::<String>(row, 1, TABLE, "session_id")?),
        conversation_id: ConversationId::from_raw(get::<String>(row, 2, TABLE, "conversation_id")?),
        tool_name: get(row, 3, TABLE, "tool_name")?,
        arguments: get(row, 4, TABLE, "arguments")?,
        result: get(row, 5, TABLE, "result")?,
        started_at: get_ts(row, 6, TABLE, "started_at")?,
        completed_at: get_ts_opt(row, 7, TABLE, "completed_at")?,
    })
}

/// Chronological transcript of one session. Ties on timestamp keep insertion
/// order.
pub(crate) fn load_transcript(
    conn: &Connection,
    session_id: &SessionId,
) -> Result<Vec<ArchivedMessage>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM archived_messages
         WHERE session_id = ?1 ORDER BY timestamp ASC, seq ASC"
    ))?;
    let mut rows = stmt.query([session_id.as_str()])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(message_from_row(row)?);
    }
    Ok(out)
}

pub(crate) fn insert_messages(
    conn: &Connection,
    messages: &[ArchivedMessage],
) -> Result<usize, StoreError> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO archived_messages
         (id, session_id, conversation_id, role, content, timestamp,
          token_count, tool_call_id, archive_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (session_id, id) DO NOTHING",
    )?;
    let mut bump =
        conn.prepare_cached("UPDATE sessions SET message_count = message_count + 1 WHERE id = ?1")?;

    let mut inserted = 0;
    for msg in messages {
        let changed = insert.execute(params![
            msg.id.as_str(),
            msg.session_id.as_str(),
            msg.conversation_id.as_str(),
            msg.role.as_str(),
            msg.content,
            fmt_ts(&msg.timestamp),
            msg.token_count,
            msg.tool_call_id.as_ref().map(ToolCallId::as_str),
            msg.archive_reason,
        ])?;
        if changed > 0 {
            bump.execute([msg.session_id.as_str()])?;
            inserted += changed;
        }
    }
    Ok(inserted)
}

/// One record per id per session: a repeated id only fills in a missing
/// result. Calls must already be validated.
pub(crate) fn upsert_tool_calls(
    conn: &Connection,
    calls: &[ArchivedToolCall],
) -> Result<usize, StoreError> {
    let mut upsert = conn.prepare_cached(
        "INSERT INTO archived_tool_calls
         (id, session_id, conversation_id, tool_name, arguments, result,
          started_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (session_id, id) DO UPDATE SET
             result = excluded.result,
             completed_at = MAX(excluded.completed_at, archived_tool_calls.started_at)
         WHERE archived_tool_calls.completed_at IS NULL
           AND excluded.completed_at IS NOT NULL",
    )?;
    let mut written = 0;
    for call in calls {
        written += upsert.execute(params![
            call.id.as_str(),
            call.session_id.as_str(),
            call.conversation_id.as_str(),
            call.tool_name,
            call.arguments,
            call.result,
            fmt_ts(&call.started_at),
            call.completed_at.as_ref().map(fmt_ts),
        ])?;
    }
    Ok(written)
}

pub(crate) fn validate_tool_calls(calls: &[ArchivedToolCall]) -> Result<(), StoreError> {
    for call in calls {
        call.validate().map_err(StoreError::Invalid)?;
    }
    Ok(())
}

impl ArchiveStore {
    /// Append a batch of messages atomically. Messages whose id already
    /// exists in their session are skipped. Returns the number inserted.
    #[instrument(skip(self, messages), fields(count = messages.len()))]
    pub fn archive_messages(&self, messages: &[ArchivedMessage]) -> Result<usize, StoreError> {
        if messages.is_empty() {
            return Ok(0);
        }
        let inserted = self.db.with_tx(|conn| insert_messages(conn, messages))?;
        debug!(inserted, "messages archived");
        Ok(inserted)
    }

    /// Append a batch of tool calls atomically. One record per id per
    /// session: a repeated id only fills in a missing result.
    #[instrument(skip(self, calls), fields(count = calls.len()))]
    pub fn archive_tool_calls(&self, calls: &[ArchivedToolCall]) -> Result<usize, StoreError> {
        validate_tool_calls(calls)?;
        if calls.is_empty() {
            return Ok(0);
        }
        self.db.with_tx(|conn| upsert_tool_calls(conn, calls))
    }

    /// Messages of a session in timestamp order; empty when there are none.
    pub fn session_transcript(&self, id: &SessionId) -> Result<Vec<ArchivedMessage>, StoreError> {
        self.db.with_conn(|conn| load_transcript(conn, id))
    }

    /// Tool calls of a session ordered by start time.
    pub fn session_tool_calls(&self, id: &SessionId) -> Result<Vec<ArchivedToolCall>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, conversation_id, tool_name, arguments, result,
                        started_at, completed_at
                 FROM archived_tool_calls WHERE session_id = ?1
                 ORDER BY started_at ASC, rowid ASC",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(tool_call_from_row(row)?);
            }
            Ok(out)
        })
    }
}
