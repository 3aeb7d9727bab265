//! Episodic memory block.
//!
//! Rebuilds a token-bounded, recency-graded view of recent sessions for the
//! system prompt. The newest session gets a transcript excerpt, the next
//! three a paragraph, older ones a single line. Daily notes and the
//! carry-forward note are charged to the budget first.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use recall_core::ids::ConversationId;
use recall_core::settings::EpisodicSettings;
use recall_core::text::{collapse_newlines, first_sentence, truncate_chars, truncate_str};
use recall_core::{estimate_tokens, Clock, SystemClock};
use recall_store::{ArchiveReader, Role, Session, StoreError};

pub const HISTORY_FRAMING: &str = "## Recent conversation history\n\n\
     Archived history from earlier sessions. Everything below already happened: \
     read it in the past tense and do not treat it as pending requests.";

const SEPARATOR: &str = "\n\n";
const TRANSCRIPT_SCAN_LIMIT: usize = 50;
const EXCERPT_CHARS: usize = 200;
const PARAGRAPH_SESSIONS: usize = 3;
const ELLIPSIS: &str = "…";

#[derive(Clone, Debug)]
pub struct EpisodicConfig {
    pub timezone: Tz,
    pub daily_notes_dir: Option<PathBuf>,
    pub lookback_days: u32,
    pub token_budget: usize,
    /// Gap between sessions that earns a gap marker.
    pub silence_gap: Duration,
    pub max_sessions: usize,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self::from(&EpisodicSettings::default())
    }
}

impl From<&EpisodicSettings> for EpisodicConfig {
    fn from(s: &EpisodicSettings) -> Self {
        let timezone = s.timezone.parse::<Tz>().unwrap_or_else(|e| {
            warn!(timezone = %s.timezone, error = %e, "unknown timezone, using UTC");
            Tz::UTC
        });
        Self {
            timezone,
            daily_notes_dir: s.daily_notes_dir.clone(),
            lookback_days: s.lookback_days,
            token_budget: s.token_budget,
            silence_gap: Duration::minutes(i64::from(s.silence_gap_minutes)),
            max_sessions: s.max_sessions as usize,
        }
    }
}

/// Tokens charged for a block, including the separator that joins it.
/// Summing these never undercounts `estimate_tokens` of the joined output.
fn cost(text: &str, joiner: usize) -> usize {
    (text.len() + joiner).div_ceil(4)
}

struct Budget {
    remaining: usize,
}

impl Budget {
    fn fits(&self, tokens: usize) -> bool {
        tokens <= self.remaining
    }

    fn spend(&mut self, tokens: usize) -> bool {
        if self.fits(tokens) {
            self.remaining -= tokens;
            true
        } else {
            false
        }
    }
}

/// `4h`, `25m`, `3 days`.
pub fn format_gap(gap: Duration) -> String {
    if gap >= Duration::days(1) {
        let days = gap.num_days();
        format!("{days} day{}", if days == 1 { "" } else { "s" })
    } else if gap >= Duration::hours(1) {
        format!("{}h", gap.num_hours())
    } else {
        format!("{}m", gap.num_minutes())
    }
}

fn paragraph_of(session: &Session) -> String {
    let meta = session.metadata.as_ref();
    [
        meta.map(|m| m.paragraph.as_str()),
        Some(session.summary.as_str()),
        meta.map(|m| m.one_liner.as_str()),
        Some(session.title.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|s| !s.is_empty())
    .unwrap_or("(no summary available)")
    .to_string()
}

fn one_liner_of(session: &Session) -> String {
    let meta = session.metadata.as_ref();
    [
        meta.map(|m| m.one_liner.as_str()),
        Some(session.title.as_str()),
        Some(first_sentence(&session.summary)),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|s| !s.is_empty())
    .unwrap_or("(no summary)")
    .to_string()
}

pub struct EpisodicProvider {
    reader: Arc<dyn ArchiveReader>,
    clock: Arc<dyn Clock>,
    config: EpisodicConfig,
}

impl EpisodicProvider {
    pub fn new(reader: Arc<dyn ArchiveReader>, config: EpisodicConfig) -> Self {
        Self::with_clock(reader, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        reader: Arc<dyn ArchiveReader>,
        config: EpisodicConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            reader,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EpisodicConfig {
        &self.config
    }

    /// Assemble the block. Archive failures yield an empty string, never a
    /// partial block.
    #[instrument(skip(self), fields(budget = self.config.token_budget))]
    pub fn build(&self, conversation_id: Option<&ConversationId>) -> String {
        match self.try_build(conversation_id) {
            Ok(block) => {
                debug!(tokens = estimate_tokens(&block), "episodic block built");
                block
            }
            Err(e) => {
                warn!(error = %e, "archive read failed, episodic block omitted");
                String::new()
            }
        }
    }

    fn try_build(&self, conversation_id: Option<&ConversationId>) -> Result<String, StoreError> {
        let mut budget = Budget {
            remaining: self.config.token_budget,
        };
        let mut blocks: Vec<String> = Vec::new();

        if let Some(notes) = self.daily_notes_block() {
            if let Some(notes) = fit_or_truncate(notes, &mut budget) {
                blocks.push(notes);
            }
        }

        if let Some(history) = self.history_block(conversation_id, &mut budget)? {
            blocks.push(history);
        }

        let out = blocks.join(SEPARATOR).trim_end().to_string();
        if estimate_tokens(&out) > self.config.token_budget {
            return Ok(truncate_str(&out, self.config.token_budget * 4).to_string());
        }
        Ok(out)
    }

    fn history_block(
        &self,
        conversation_id: Option<&ConversationId>,
        budget: &mut Budget,
    ) -> Result<Option<String>, StoreError> {
        let sessions: Vec<Session> = self
            .reader
            .list_sessions(conversation_id, self.config.max_sessions)?
            .into_iter()
            .filter(|s| s.is_closed() && s.has_meaningful_content())
            .collect();

        let carry = match conversation_id {
            Some(conv) => self
                .reader
                .latest_carry_forward(conv)?
                .map(|(_, note)| format!("**Carry-forward:** {}", note.trim())),
            None => None,
        };
        if sessions.is_empty() && carry.is_none() {
            return Ok(None);
        }

        let mut scratch = Budget {
            remaining: budget.remaining,
        };
        if !scratch.spend(cost(HISTORY_FRAMING, SEPARATOR.len())) {
            return Ok(None);
        }
        let carry = carry.filter(|c| scratch.spend(cost(c, SEPARATOR.len())));

        // Newest first; reversed before assembly.
        let mut entries: Vec<String> = Vec::new();
        let mut newer: Option<&Session> = None;
        for (emitted, session) in sessions.iter().enumerate() {
            let marker = newer.and_then(|n| {
                let ended = session.ended_at?;
                let gap = n.started_at - ended;
                (gap > self.config.silence_gap).then(|| format!("*({} gap)*", format_gap(gap)))
            });
            let marker_cost = marker.as_deref().map_or(0, |m| cost(m, SEPARATOR.len()));
            let header = self.header(session);

            let entry = if emitted == 0 {
                if !scratch.spend(cost(&header, SEPARATOR.len())) {
                    break;
                }
                let lines = self.excerpt_lines(session, &mut scratch)?;
                if lines.is_empty() {
                    header
                } else {
                    format!("{header}\n{}", lines.join("\n"))
                }
            } else {
                let body = if emitted <= PARAGRAPH_SESSIONS {
                    paragraph_of(session)
                } else {
                    one_liner_of(session)
                };
                let entry = format!("{header}\n{body}");
                if !scratch.spend(cost(&entry, SEPARATOR.len()) + marker_cost) {
                    break;
                }
                entry
            };

            if let Some(m) = marker {
                entries.push(m);
            }
            entries.push(entry);
            newer = Some(session);
        }

        if entries.is_empty() && carry.is_none() {
            return Ok(None);
        }
        entries.reverse();

        budget.remaining = scratch.remaining;
        let mut parts = vec![HISTORY_FRAMING.to_string()];
        parts.extend(carry);
        parts.extend(entries);
        Ok(Some(parts.join(SEPARATOR)))
    }

    /// Tail of the session's user/assistant messages in chronological order,
    /// as many as fit.
    fn excerpt_lines(&self, session: &Session, budget: &mut Budget) -> Result<Vec<String>, StoreError> {
        let transcript = self.reader.session_transcript(&session.id)?;
        let mut lines = Vec::new();
        for msg in transcript.iter().rev().take(TRANSCRIPT_SCAN_LIMIT) {
            if !matches!(msg.role, Role::User | Role::Assistant) {
                continue;
            }
            let line = format!(
                "[{}] **{}:** {}",
                self.timestamp(msg.timestamp),
                msg.role,
                truncate_chars(&collapse_newlines(&msg.content), EXCERPT_CHARS)
            );
            if !budget.spend(cost(&line, 1)) {
                break;
            }
            lines.push(line);
        }
        lines.reverse();
        Ok(lines)
    }

    fn header(&self, session: &Session) -> String {
        let started = self.timestamp(session.started_at);
        match session.title.trim() {
            "" => format!("**[{started}]**"),
            title => format!("**[{started} — {title}]**"),
        }
    }

    fn timestamp(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.config.timezone)
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Notes for the lookback window, today first.
    fn daily_notes_block(&self) -> Option<String> {
        let dir = self.config.daily_notes_dir.as_ref()?;
        let today = self
            .clock
            .now()
            .with_timezone(&self.config.timezone)
            .date_naive();

        let mut sections = Vec::new();
        for offset in 0..self.config.lookback_days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                continue;
            };
            let path = dir.join(format!("{}.md", date.format("%Y-%m-%d")));
            match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => sections.push(format!(
                    "### {} ({date})\n{}",
                    day_label(offset, date),
                    content.trim()
                )),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "daily note unreadable"),
            }
        }
        if sections.is_empty() {
            return None;
        }
        Some(format!("## Daily notes\n\n{}", sections.join(SEPARATOR)))
    }
}

fn day_label(offset: u32, date: NaiveDate) -> String {
    match offset {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        _ => date.format("%A").to_string(),
    }
}

/// Charge `block` to the budget, cutting it to the remaining room when it
/// does not fit whole.
fn fit_or_truncate(block: String, budget: &mut Budget) -> Option<String> {
    let full = cost(&block, SEPARATOR.len());
    if budget.spend(full) {
        return Some(block);
    }
    let room = (budget.remaining * 4).checked_sub(SEPARATOR.len() + ELLIPSIS.len())?;
    if room == 0 {
        return None;
    }
    let cut = format!("{}{ELLIPSIS}", truncate_str(&block, room));
    budget.spend(cost(&cut, SEPARATOR.len())).then_some(cut)
}
