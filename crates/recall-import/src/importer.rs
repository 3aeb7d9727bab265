//! Turns OpenClaw transcripts into archived sessions.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use recall_core::ids::{ConversationId, MessageId, SessionId, ToolCallId};
use recall_core::{Clock, SystemClock};
use recall_store::{ArchiveStore, ArchivedMessage, ArchivedToolCall, Role, SessionImport};

use crate::error::ImportError;
use crate::parser::{parse_file, ParsedTranscript};

/// Source type recorded in the imports table.
pub const SOURCE_TYPE: &str = "openclaw";

const ARCHIVE_REASON: &str = "import";

/// Counts reported at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files_seen: usize,
    pub imported: usize,
    /// Already imported on an earlier run.
    pub skipped: usize,
    pub failed: usize,
    pub messages: usize,
    pub tool_calls: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files: {}  imported: {}  skipped: {}  failed: {}  messages: {}  tool calls: {}",
            self.files_seen, self.imported, self.skipped, self.failed, self.messages, self.tool_calls
        )
    }
}

/// Result for a single transcript file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Imported {
        /// None on a dry run.
        session_id: Option<SessionId>,
        messages: usize,
        tool_calls: usize,
    },
    AlreadyImported,
}

/// Foreign id of a transcript: its file stem.
pub fn foreign_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `openclaw:<agent>` for `.../agents/<agent>/sessions/<file>`, else `openclaw`.
pub fn conversation_for(path: &Path) -> ConversationId {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    parts
        .windows(3)
        .rev()
        .find(|w| w[0] == "agents" && w[2] == "sessions")
        .map(|w| ConversationId::from_raw(format!("{SOURCE_TYPE}:{}", w[1])))
        .unwrap_or_else(|| ConversationId::from_raw(SOURCE_TYPE))
}

/// Every `*.jsonl` file under `root`, sorted.
pub fn discover(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

pub struct OpenClawImporter {
    store: ArchiveStore,
    clock: Arc<dyn Clock>,
    dry_run: bool,
}

impl OpenClawImporter {
    pub fn new(store: ArchiveStore) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            dry_run: false,
        }
    }

    /// Parse and count without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Remove every session imported from OpenClaw.
    pub fn purge(&self) -> Result<usize, ImportError> {
        Ok(self.store.purge_imported(SOURCE_TYPE)?)
    }

    /// Import every transcript under `root`. A failing file is logged and
    /// counted; it does not stop the run.
    #[instrument(skip(self), fields(root = %root.display(), dry_run = self.dry_run))]
    pub fn import_dir(&self, root: &Path) -> Result<ImportSummary, ImportError> {
        if !root.is_dir() {
            return Err(ImportError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut summary = ImportSummary::default();
        for path in discover(root) {
            summary.files_seen += 1;
            match self.import_file(&path) {
                Ok(FileOutcome::Imported {
                    messages,
                    tool_calls,
                    ..
                }) => {
                    summary.imported += 1;
                    summary.messages += messages;
                    summary.tool_calls += tool_calls;
                }
                Ok(FileOutcome::AlreadyImported) => summary.skipped += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "import failed");
                    summary.failed += 1;
                }
            }
        }
        info!(
            files = summary.files_seen,
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed,
            "import finished"
        );
        Ok(summary)
    }

    /// Import one transcript as a closed session.
    pub fn import_file(&self, path: &Path) -> Result<FileOutcome, ImportError> {
        let foreign = foreign_id(path);
        if self.store.is_imported(&foreign, SOURCE_TYPE)? {
            debug!(foreign_id = %foreign, "already imported");
            return Ok(FileOutcome::AlreadyImported);
        }

        let parsed = parse_file(path)?;
        let conversation = conversation_for(path);
        let started_at = parsed
            .started_at
            .or_else(|| parsed.messages.iter().find_map(|m| m.timestamp))
            .unwrap_or_else(|| self.clock.now());

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.dry_run {
            let messages = 1 + parsed.messages.iter().filter(|m| !m.content.is_empty()).count();
            return Ok(FileOutcome::Imported {
                session_id: None,
                messages,
                tool_calls: parsed.tool_call_count(),
            });
        }

        let session_id = SessionId::new();
        let (messages, tool_calls, ended_at) =
            build_records(&parsed, &session_id, &conversation, started_at, &foreign, &file_name);
        let import = SessionImport {
            foreign_id: foreign.clone(),
            source_type: SOURCE_TYPE.to_string(),
            session_id,
            conversation_id: conversation,
            started_at,
            ended_at,
            messages,
            tool_calls,
        };

        let Some(counts) = self.store.import_session(&import)? else {
            debug!(foreign_id = %foreign, "imported concurrently");
            return Ok(FileOutcome::AlreadyImported);
        };

        info!(
            foreign_id = %foreign,
            session_id = %import.session_id,
            conversation_id = %import.conversation_id,
            messages = counts.messages,
            tool_calls = counts.tool_calls,
            "transcript imported"
        );
        Ok(FileOutcome::Imported {
            session_id: Some(import.session_id),
            messages: counts.messages,
            tool_calls: counts.tool_calls,
        })
    }
}

/// Messages and tool calls for one transcript, plus the session end time.
///
/// Lines with an unreadable timestamp reuse the previous one and do not move
/// the end time.
fn build_records(
    parsed: &ParsedTranscript,
    session_id: &SessionId,
    conversation: &ConversationId,
    started_at: DateTime<Utc>,
    foreign: &str,
    file_name: &str,
) -> (Vec<ArchivedMessage>, Vec<ArchivedToolCall>, DateTime<Utc>) {
    let mut messages = vec![ArchivedMessage::new(
        session_id,
        conversation,
        Role::System,
        format!("Imported from openclaw session {foreign} ({file_name})"),
        started_at,
    )
    .with_reason(ARCHIVE_REASON)];
    let mut calls: Vec<ArchivedToolCall> = Vec::new();
    let mut pending: HashMap<String, usize> = HashMap::new();
    let mut last_ts = started_at;
    let mut ended_at = started_at;

    for msg in &parsed.messages {
        let ts = match msg.timestamp {
            Some(ts) => {
                ended_at = ended_at.max(ts);
                last_ts = ts;
                ts
            }
            None => last_ts,
        };

        for call in &msg.tool_calls {
            let id = if call.id.is_empty() {
                ToolCallId::new()
            } else {
                ToolCallId::from_raw(call.id.as_str())
            };
            pending.insert(id.to_string(), calls.len());
            calls.push(ArchivedToolCall::started(
                id,
                session_id,
                conversation,
                call.name.as_str(),
                call.arguments.as_str(),
                ts,
            ));
        }

        if msg.role == Role::Tool {
            if let Some(idx) = msg.tool_call_id.as_ref().and_then(|id| pending.remove(id)) {
                let call = calls[idx].clone();
                calls[idx] = call.complete(msg.content.as_str(), ts);
            }
        }

        if msg.content.is_empty() {
            continue;
        }
        let mut archived =
            ArchivedMessage::new(session_id, conversation, msg.role, msg.content.as_str(), ts)
                .with_reason(ARCHIVE_REASON);
        if let Some(id) = msg.id.as_deref().filter(|id| !id.is_empty()) {
            archived = archived.with_id(MessageId::from_raw(id));
        }
        if let Some(call_id) = msg.tool_call_id.as_deref() {
            archived = archived.with_tool_call_id(ToolCallId::from_raw(call_id));
        }
        messages.push(archived);
    }

    (messages, calls, ended_at)
}
