//! Full-text search over archived message content.
//!
//! Hits come from the FTS5 index ranked by BM25. Each hit is returned with
//! the conversational window around it: neighbouring messages are included
//! until the gap between consecutive timestamps exceeds the silence
//! threshold.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use tracing::{debug, instrument};

use recall_core::ids::{ConversationId, SessionId};

use crate::archive::ArchiveStore;
use crate::error::StoreError;
use crate::messages::{load_transcript, message_from_row, MESSAGE_COLUMNS};
use crate::row_helpers::{fmt_ts, get};
use crate::types::{ArchivedMessage, Role};

#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub query: String,
    pub conversation_id: Option<ConversationId>,
    pub session_id: Option<SessionId>,
    pub role: Option<Role>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub silence_minutes: i64,
    /// Cap on context messages collected on each side of a hit. `None`
    /// walks until a silence gap or the session edge.
    pub max_context_each_side: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            conversation_id: None,
            session_id: None,
            role: None,
            since: None,
            until: None,
            limit: 20,
            silence_minutes: 10,
            max_context_each_side: None,
        }
    }
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchResult {
    pub message: ArchivedMessage,
    pub session_id: SessionId,
    /// Silence-bounded window in chronological order, including the hit.
    pub context: Vec<ArchivedMessage>,
    /// BM25 score; lower is better.
    pub rank: f64,
}

/// Quote every whitespace-separated token so user input is never parsed as
/// FTS5 query syntax. Tokens are ANDed.
pub fn fts_query(raw: &str) -> String {
    raw.split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Indices `[start, end]` of the silence-bounded window around `hit`.
pub(crate) fn silence_window(
    messages: &[ArchivedMessage],
    hit: usize,
    silence: Duration,
    max_each_side: Option<usize>,
) -> (usize, usize) {
    let cap = max_each_side.unwrap_or(usize::MAX);
    let mut start = hit;
    while start > 0
        && hit - start < cap
        && messages[start].timestamp - messages[start - 1].timestamp <= silence
    {
        start -= 1;
    }
    let mut end = hit;
    while end + 1 < messages.len()
        && end - hit < cap
        && messages[end + 1].timestamp - messages[end].timestamp <= silence
    {
        end += 1;
    }
    (start, end)
}

impl ArchiveStore {
    #[instrument(skip(self, opts), fields(query = %opts.query, limit = opts.limit))]
    pub fn search(&self, opts: &SearchOptions) -> Result<Vec<SearchResult>, StoreError> {
        let matcher = fts_query(&opts.query);
        if matcher.is_empty() || opts.limit == 0 {
            return Ok(Vec::new());
        }
        let silence = Duration::minutes(opts.silence_minutes.max(0));
        let columns = MESSAGE_COLUMNS
            .split(',')
            .map(|c| format!("m.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns}, bm25(archived_messages_fts) AS score
             FROM archived_messages_fts
             JOIN archived_messages m ON m.seq = archived_messages_fts.rowid
             WHERE archived_messages_fts MATCH ?1
               AND (?2 IS NULL OR m.conversation_id = ?2)
               AND (?3 IS NULL OR m.session_id = ?3)
               AND (?4 IS NULL OR m.role = ?4)
               AND (?5 IS NULL OR m.timestamp >= ?5)
               AND (?6 IS NULL OR m.timestamp <= ?6)
             ORDER BY score ASC, m.timestamp DESC
             LIMIT ?7"
        );

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![
                matcher,
                opts.conversation_id.as_ref().map(ConversationId::as_str),
                opts.session_id.as_ref().map(SessionId::as_str),
                opts.role.map(|r| r.as_str()),
                opts.since.as_ref().map(fmt_ts),
                opts.until.as_ref().map(fmt_ts),
                i64::try_from(opts.limit).unwrap_or(i64::MAX),
            ])?;

            let mut hits = Vec::new();
            while let Some(row) = rows.next()? {
                let message = message_from_row(row)?;
                let rank: f64 = get(row, 9, "archived_messages_fts", "score")?;
                hits.push((message, rank));
            }
            drop(rows);

            let mut transcripts: HashMap<SessionId, Vec<ArchivedMessage>> = HashMap::new();
            let mut results = Vec::with_capacity(hits.len());
            for (message, rank) in hits {
                if !transcripts.contains_key(&message.session_id) {
                    let transcript = load_transcript(conn, &message.session_id)?;
                    let _ = transcripts.insert(message.session_id.clone(), transcript);
                }
                let transcript = transcripts
                    .get(&message.session_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let context = match transcript.iter().position(|m| m.id == message.id) {
                    Some(idx) => {
                        let (start, end) = silence_window(
                            transcript,
                            idx,
                            silence,
                            opts.max_context_each_side,
                        );
                        transcript[start..=end].to_vec()
                    }
                    None => vec![message.clone()],
                };
                results.push(SearchResult {
                    session_id: message.session_id.clone(),
                    message,
                    context,
                    rank,
                });
            }
            debug!(hits = results.len(), "search complete");
            Ok(results)
        })
    }
}
