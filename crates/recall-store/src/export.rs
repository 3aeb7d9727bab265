use std::fmt::Write;

use recall_core::ids::SessionId;

use crate::archive::ArchiveStore;
use crate::error::StoreError;
use crate::row_helpers::fmt_ts;

impl ArchiveStore {
    /// Human-readable markdown transcript of one session.
    pub fn export_session_markdown(&self, id: &SessionId) -> Result<String, StoreError> {
        let session = self.get_session(id)?;
        let messages = self.session_transcript(id)?;

        let mut out = String::new();
        let ended = session
            .ended_at
            .as_ref()
            .map_or_else(|| "active".to_string(), fmt_ts);
        let _ = write!(
            out,
            "# Session {}\n\nStarted: {}\nEnded: {}\n\n",
            session.id.short(),
            fmt_ts(&session.started_at),
            ended
        );
        for msg in &messages {
            let _ = write!(
                out,
                "## {} {}\n{}\n\n",
                msg.role,
                fmt_ts(&msg.timestamp),
                msg.content
            );
        }
        Ok(out)
    }
}
