use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use recall_core::estimate_tokens;
use recall_core::ids::{ConversationId, MessageId, SessionId, ToolCallId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Normal,
    Timeout,
    Reset,
    CrashRecovery,
    Import,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Timeout => "timeout",
            Self::Reset => "reset",
            Self::CrashRecovery => "crash_recovery",
            Self::Import => "import",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EndReason {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "timeout" => Ok(Self::Timeout),
            "reset" => Ok(Self::Reset),
            "crash_recovery" => Ok(Self::CrashRecovery),
            "import" => Ok(Self::Import),
            other => Err(format!("unknown end reason: {other}")),
        }
    }
}

/// Structured description of a session, written by the summarizer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub one_liner: String,
    pub paragraph: String,
    pub detailed: String,
    pub key_decisions: Vec<String>,
    pub participants: Vec<String>,
    pub session_type: String,
    /// Tool name to invocation count.
    pub tools_used: BTreeMap<String, u32>,
}

impl SessionMetadata {
    pub fn has_text(&self) -> bool {
        !self.one_liner.trim().is_empty()
            || !self.paragraph.trim().is_empty()
            || !self.detailed.trim().is_empty()
    }
}

/// One bounded conversation attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub conversation_id: ConversationId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub message_count: u32,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub metadata: Option<SessionMetadata>,
    pub carry_forward: Option<String>,
}

impl Session {
    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// True when there is anything worth showing: a title, a summary, or
    /// metadata prose.
    pub fn has_meaningful_content(&self) -> bool {
        !self.title.trim().is_empty()
            || !self.summary.trim().is_empty()
            || self.metadata.as_ref().is_some_and(SessionMetadata::has_text)
    }
}

/// One role-tagged utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: u32,
    pub tool_call_id: Option<ToolCallId>,
    pub archive_reason: String,
}

impl ArchivedMessage {
    /// New message with a generated id and an estimated token count.
    pub fn new(
        session_id: &SessionId,
        conversation_id: &ConversationId,
        role: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        Self {
            id: MessageId::new(),
            session_id: session_id.clone(),
            conversation_id: conversation_id.clone(),
            role,
            token_count: estimate_tokens(&content) as u32,
            content,
            timestamp,
            tool_call_id: None,
            archive_reason: String::new(),
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn with_tool_call_id(mut self, id: ToolCallId) -> Self {
        self.tool_call_id = Some(id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.archive_reason = reason.into();
        self
    }
}

/// One model-invoked tool execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchivedToolCall {
    pub id: ToolCallId,
    pub session_id: SessionId,
    pub conversation_id: ConversationId,
    pub tool_name: String,
    /// JSON text.
    pub arguments: String,
    pub result: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ArchivedToolCall {
    pub fn started(
        id: ToolCallId,
        session_id: &SessionId,
        conversation_id: &ConversationId,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id: session_id.clone(),
            conversation_id: conversation_id.clone(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
            result: String::new(),
            started_at,
            completed_at: None,
        }
    }

    /// Record the result. Completion never precedes the start.
    pub fn complete(mut self, result: impl Into<String>, at: DateTime<Utc>) -> Self {
        self.result = result.into();
        self.completed_at = Some(at.max(self.started_at));
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self.completed_at {
            Some(done) if done < self.started_at => Err(format!(
                "tool call {} completes before it starts",
                self.id
            )),
            None if !self.result.is_empty() => Err(format!(
                "tool call {} has a result but no completion time",
                self.id
            )),
            _ => Ok(()),
        }
    }
}
