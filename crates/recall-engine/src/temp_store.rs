//! Labelled temp files for passing large blobs by reference.
//!
//! The store owns its base directory and the label namespace: it is the only
//! writer of files under `base_dir` and of `temp_files` rows. Files are named
//! `<conversation>_<label>_<8 hex>.md`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, instrument, warn};

use recall_core::ids::ConversationId;
use recall_core::{Clock, SystemClock};
use recall_store::{Database, TempFileRecord, TempFileRepo};

use crate::error::TempFileError;

static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,62}$").unwrap());

const TEMP_PREFIX: &str = "temp:";
const MAX_CONVERSATION_PREFIX: usize = 64;

pub fn is_valid_label(label: &str) -> bool {
    LABEL_PATTERN.is_match(label)
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Conversation id made filesystem-safe: anything outside `[A-Za-z0-9_-]`
/// becomes `_`, capped at 64 characters.
pub fn sanitize_conversation_id(id: &str) -> String {
    id.chars()
        .map(|c| if is_label_char(c) { c } else { '_' })
        .take(MAX_CONVERSATION_PREFIX)
        .collect()
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TempFileError + '_ {
    move |source| TempFileError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    }
}

#[derive(Clone)]
pub struct TempFileStore {
    repo: TempFileRepo,
    base_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl TempFileStore {
    pub fn new(db: Database, base_dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(db, base_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, base_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: TempFileRepo::new(db),
            base_dir: base_dir.into(),
            clock,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Write `content` under `label`, replacing any earlier file for the
    /// same label. Returns the new file path.
    #[instrument(skip(self, content), fields(conversation_id = %conversation_id, bytes = content.len()))]
    pub fn create(
        &self,
        conversation_id: &ConversationId,
        label: &str,
        content: &str,
    ) -> Result<PathBuf, TempFileError> {
        if !is_valid_label(label) {
            return Err(TempFileError::InvalidLabel(label.to_string()));
        }

        if !self.base_dir.exists() {
            std::fs::create_dir_all(&self.base_dir).map_err(io_err(&self.base_dir))?;
            set_mode(&self.base_dir, 0o755).map_err(io_err(&self.base_dir))?;
        }

        let suffix: [u8; 4] = rand::random();
        let hex: String = suffix.iter().map(|b| format!("{b:02x}")).collect();
        let path = self.base_dir.join(format!(
            "{}_{}_{}.md",
            sanitize_conversation_id(conversation_id.as_str()),
            label,
            hex
        ));
        std::fs::write(&path, content).map_err(io_err(&path))?;
        if let Err(e) = set_mode(&path, 0o644) {
            remove_quietly(&path);
            return Err(TempFileError::Io { path, source: e });
        }

        let previous = match self.repo.get(conversation_id, label) {
            Ok(prev) => prev,
            Err(e) => {
                remove_quietly(&path);
                return Err(e.into());
            }
        };
        if let Some(prev) = previous.filter(|p| p.path != path) {
            remove_quietly(&prev.path);
        }

        let record = TempFileRecord {
            conversation_id: conversation_id.clone(),
            label: label.to_string(),
            path: path.clone(),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.repo.upsert(&record) {
            remove_quietly(&path);
            return Err(e.into());
        }
        debug!(label, path = %path.display(), "temp file created");
        Ok(path)
    }

    /// Path registered for `label`, if any.
    pub fn path(
        &self,
        conversation_id: &ConversationId,
        label: &str,
    ) -> Result<Option<PathBuf>, TempFileError> {
        Ok(self.repo.get(conversation_id, label)?.map(|r| r.path))
    }

    /// Contents of the file behind `label`.
    pub fn read(&self, conversation_id: &ConversationId, label: &str) -> Result<String, TempFileError> {
        let path = self
            .path(conversation_id, label)?
            .ok_or_else(|| TempFileError::UnknownLabel(label.to_string()))?;
        std::fs::read_to_string(&path).map_err(io_err(&path))
    }

    /// `(label, path)` pairs of the conversation, ordered by label.
    pub fn list(&self, conversation_id: &ConversationId) -> Result<Vec<(String, PathBuf)>, TempFileError> {
        Ok(self
            .repo
            .list(conversation_id)?
            .into_iter()
            .map(|r| (r.label, r.path))
            .collect())
    }

    /// Replace `temp:LABEL` occurrences inside free text with file contents.
    ///
    /// Labels are tried longest first and a match must end at a non-label
    /// character, so `temp:draft` never eats the front of `temp:draft2`.
    /// Unregistered labels are left as written.
    pub fn expand_labels(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<String, TempFileError> {
        if !text.contains(TEMP_PREFIX) {
            return Ok(text.to_string());
        }
        let mut labels = self.repo.list(conversation_id)?;
        if labels.is_empty() {
            return Ok(text.to_string());
        }
        labels.sort_by(|a, b| b.label.len().cmp(&a.label.len()).then(a.label.cmp(&b.label)));

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(TEMP_PREFIX) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + TEMP_PREFIX.len()..];
            let hit = labels.iter().find(|r| {
                after.starts_with(r.label.as_str())
                    && !after[r.label.len()..].chars().next().is_some_and(is_label_char)
            });
            match hit {
                Some(record) => {
                    let content =
                        std::fs::read_to_string(&record.path).map_err(io_err(&record.path))?;
                    out.push_str(&content);
                    rest = &after[record.label.len()..];
                }
                None => {
                    out.push_str(TEMP_PREFIX);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Remove every file and mapping of the conversation. File errors are
    /// logged and do not stop the rest. Returns the number of mappings
    /// removed.
    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    pub fn cleanup(&self, conversation_id: &ConversationId) -> Result<usize, TempFileError> {
        for record in self.repo.list(conversation_id)? {
            remove_quietly(&record.path);
        }
        Ok(self.repo.delete_all(conversation_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempFileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = TempFileStore::new(Database::in_memory().unwrap(), dir.path().join("temp"));
        (store, dir)
    }

    fn conv() -> ConversationId {
        ConversationId::from_raw("telegram:42")
    }

    #[test]
    fn label_validation() {
        assert!(is_valid_label("draft"));
        assert!(is_valid_label("a"));
        assert!(is_valid_label("Report_2026-02"));
        assert!(is_valid_label(&"x".repeat(63)));
        assert!(!is_valid_label(&"x".repeat(64)));
        assert!(!is_valid_label("_draft"));
        assert!(!is_valid_label("has space"));
        assert!(!is_valid_label(""));
        assert!(!is_valid_label("dot.md"));
    }

    #[test]
    fn sanitized_prefix() {
        assert_eq!(sanitize_conversation_id("telegram:42/x"), "telegram_42_x");
        assert_eq!(sanitize_conversation_id(&"é".repeat(100)).chars().count(), 64);
    }

    #[test]
    fn create_writes_file_with_layout() {
        let (store, _dir) = store();
        let path = store.create(&conv(), "draft", "X").unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("telegram_42_draft_"), "{name}");
        assert!(name.ends_with(".md"));
        assert_eq!(name.len(), "telegram_42_draft_".len() + 8 + 3);
        assert_eq!(store.read(&conv(), "draft").unwrap(), "X");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o644);
            let dir_mode =
                std::fs::metadata(store.base_dir()).unwrap().permissions().mode() & 0o777;
            assert_eq!(dir_mode, 0o755);
        }
    }

    #[test]
    fn invalid_label_is_rejected() {
        let (store, _dir) = store();
        let err = store.create(&conv(), "no/slashes", "x").unwrap_err();
        assert!(matches!(err, TempFileError::InvalidLabel(_)));
        assert!(!store.base_dir().exists());
    }

    #[test]
    fn overwrite_removes_old_file() {
        let (store, _dir) = store();
        let first = store.create(&conv(), "draft", "one").unwrap();
        let second = store.create(&conv(), "draft", "two").unwrap();
        assert_ne!(first, second);
        assert!(!first.exists());
        assert_eq!(store.read(&conv(), "draft").unwrap(), "two");
        assert_eq!(store.list(&conv()).unwrap().len(), 1);
    }

    #[test]
    fn read_unknown_label() {
        let (store, _dir) = store();
        assert!(matches!(
            store.read(&conv(), "ghost"),
            Err(TempFileError::UnknownLabel(_))
        ));
    }

    #[test]
    fn expand_prefers_longest_label() {
        let (store, _dir) = store();
        store.create(&conv(), "draft", "SHORT").unwrap();
        store.create(&conv(), "draft2", "LONG").unwrap();

        let out = store
            .expand_labels(&conv(), "a=temp:draft2 b=temp:draft c=temp:draft3 d=temp:")
            .unwrap();
        assert_eq!(out, "a=LONG b=SHORT c=temp:draft3 d=temp:");
    }

    #[test]
    fn expand_does_not_rescan_inserted_content() {
        let (store, _dir) = store();
        store.create(&conv(), "outer", "see temp:inner").unwrap();
        store.create(&conv(), "inner", "INNER").unwrap();
        assert_eq!(
            store.expand_labels(&conv(), "temp:outer.").unwrap(),
            "see temp:inner."
        );
    }

    #[test]
    fn cleanup_removes_files_and_mappings() {
        let (store, _dir) = store();
        let a = store.create(&conv(), "a", "1").unwrap();
        let b = store.create(&conv(), "b", "2").unwrap();
        std::fs::remove_file(&b).unwrap();
        let other = ConversationId::from_raw("other");
        let kept = store.create(&other, "a", "3").unwrap();

        assert_eq!(store.cleanup(&conv()).unwrap(), 2);
        assert!(!a.exists());
        assert!(store.list(&conv()).unwrap().is_empty());
        assert!(kept.exists());
        assert_eq!(store.list(&other).unwrap().len(), 1);
    }
}
