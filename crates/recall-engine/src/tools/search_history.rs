use std::fmt::Write;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};

use recall_core::ids::SessionId;
use recall_core::settings::ArchiveSettings;
use recall_core::text::{collapse_newlines, truncate_chars};
use recall_store::{ArchiveStore, Role, SearchOptions, SearchResult};

use crate::error::ToolError;
use crate::tool::{ToolContext, TypedTool};

const MAX_LIMIT: usize = 50;
const CONTENT_CHARS: usize = 300;

#[derive(Clone, Debug)]
pub struct SearchHistoryConfig {
    pub default_limit: usize,
    pub silence_minutes: i64,
}

impl Default for SearchHistoryConfig {
    fn default() -> Self {
        Self::from(&ArchiveSettings::default())
    }
}

impl From<&ArchiveSettings> for SearchHistoryConfig {
    fn from(s: &ArchiveSettings) -> Self {
        Self {
            default_limit: s.search_limit as usize,
            silence_minutes: i64::from(s.search_silence_minutes),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchHistoryArgs {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Search every conversation instead of the current one.
    #[serde(default)]
    pub all_conversations: bool,
}

/// Full-text search over archived messages.
pub struct SearchHistoryTool {
    archive: ArchiveStore,
    config: SearchHistoryConfig,
}

impl SearchHistoryTool {
    pub fn new(archive: ArchiveStore, config: SearchHistoryConfig) -> Self {
        Self { archive, config }
    }
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No archived messages match \"{query}\".");
    }
    let mut out = format!("Found {} result(s) for \"{query}\":\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let _ = write!(
            out,
            "\n### {}. session {} at {}\n",
            i + 1,
            result.session_id.short(),
            result
                .message
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        for msg in &result.context {
            let marker = if msg.id == result.message.id { ">" } else { " " };
            let _ = writeln!(
                out,
                "{marker} [{}] {}: {}",
                msg.timestamp.format("%H:%M"),
                msg.role,
                truncate_chars(&collapse_newlines(&msg.content), CONTENT_CHARS)
            );
        }
    }
    out
}

#[async_trait]
impl TypedTool for SearchHistoryTool {
    type Args = SearchHistoryArgs;

    fn name(&self) -> &str {
        "search_history"
    }

    fn description(&self) -> &str {
        "Search archived conversation history. Returns matching messages with the \
         surrounding exchange."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": {"type": "string", "description": "Words to search for"},
                "limit": {"type": "integer", "description": "Maximum results (default 20)"},
                "session_id": {"type": "string", "description": "Restrict to one session"},
                "role": {
                    "type": "string",
                    "enum": ["user", "assistant", "tool", "system"],
                    "description": "Restrict to one speaker role"
                },
                "all_conversations": {
                    "type": "boolean",
                    "description": "Search every conversation, not just this one"
                }
            }
        })
    }

    async fn call(&self, args: SearchHistoryArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".into()));
        }
        let role = args
            .role
            .as_deref()
            .map(|r| r.parse::<Role>())
            .transpose()
            .map_err(ToolError::InvalidArguments)?;

        let opts = SearchOptions {
            query: args.query.clone(),
            conversation_id: (!args.all_conversations).then(|| ctx.conversation_id.clone()),
            session_id: args.session_id.as_deref().map(SessionId::from_raw),
            role,
            limit: args
                .limit
                .unwrap_or(self.config.default_limit)
                .clamp(1, MAX_LIMIT),
            silence_minutes: self.config.silence_minutes,
            ..Default::default()
        };
        let results = self
            .archive
            .search(&opts)
            .map_err(|e| ToolError::ExecutionFailed(format!("search failed: {e}")))?;
        Ok(format_results(&args.query, &results))
    }
}
