use chrono::{DateTime, Utc};

use recall_core::ids::{ConversationId, SessionId};

use crate::archive::ArchiveStore;
use crate::error::StoreError;
use crate::types::{ArchivedMessage, ArchivedToolCall, Session, SessionMetadata};

/// Read-only view of the archive consumed by the episodic provider and the
/// summarizer. Lets tests substitute failing or canned archives.
pub trait ArchiveReader: Send + Sync {
    fn list_sessions(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError>;

    fn session_transcript(&self, id: &SessionId) -> Result<Vec<ArchivedMessage>, StoreError>;

    fn session_tool_calls(&self, id: &SessionId) -> Result<Vec<ArchivedToolCall>, StoreError>;

    fn latest_carry_forward(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<(SessionId, String)>, StoreError>;
}

impl ArchiveReader for ArchiveStore {
    fn list_sessions(
        &self,
        conversation_id: Option<&ConversationId>,
        limit: usize,
    ) -> Result<Vec<Session>, StoreError> {
        ArchiveStore::list_sessions(self, conversation_id, limit)
    }

    fn session_transcript(&self, id: &SessionId) -> Result<Vec<ArchivedMessage>, StoreError> {
        ArchiveStore::session_transcript(self, id)
    }

    fn session_tool_calls(&self, id: &SessionId) -> Result<Vec<ArchivedToolCall>, StoreError> {
        ArchiveStore::session_tool_calls(self, id)
    }

    fn latest_carry_forward(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<(SessionId, String)>, StoreError> {
        ArchiveStore::latest_carry_forward(self, conversation_id)
    }
}

/// The summarizer's slice of the archive: find sessions awaiting metadata,
/// close orphans and write generated metadata.
pub trait SummaryStore: ArchiveReader {
    fn unsummarized_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError>;

    fn close_orphaned_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    fn set_session_metadata(
        &self,
        id: &SessionId,
        metadata: &SessionMetadata,
        title: &str,
        tags: &[String],
    ) -> Result<(), StoreError>;
}

impl SummaryStore for ArchiveStore {
    fn unsummarized_sessions(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        ArchiveStore::unsummarized_sessions(self, limit)
    }

    fn close_orphaned_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        ArchiveStore::close_orphaned_sessions(self, cutoff)
    }

    fn set_session_metadata(
        &self,
        id: &SessionId,
        metadata: &SessionMetadata,
        title: &str,
        tags: &[String],
    ) -> Result<(), StoreError> {
        ArchiveStore::set_session_metadata(self, id, metadata, title, tags)
    }
}
