//! Prefix-reference expansion for tool arguments.
//!
//! A top-level string argument that is exactly `temp:LABEL` or
//! `<prefix>:<relative path>` (no whitespace) is replaced by the referenced
//! file's contents before the handler runs. `temp:` failures are hard errors;
//! path-prefix failures leave the value untouched.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument};

use recall_core::ids::ConversationId;
use recall_core::settings::ResolverSettings;

use crate::error::{ResolveError, TempFileError};
use crate::temp_store::TempFileStore;
use crate::tool::ToolArgs;

const TEMP: &str = "temp";

#[derive(Clone)]
pub struct ContentResolver {
    temp: TempFileStore,
    prefixes: BTreeMap<String, PathBuf>,
}

impl ContentResolver {
    pub fn new(temp: TempFileStore) -> Self {
        Self {
            temp,
            prefixes: BTreeMap::new(),
        }
    }

    pub fn from_settings(temp: TempFileStore, settings: &ResolverSettings) -> Self {
        let mut resolver = Self::new(temp);
        for (prefix, dir) in &settings.path_prefixes {
            resolver = resolver.with_prefix(prefix.clone(), dir.clone());
        }
        resolver
    }

    /// Map `<prefix>:` references into files under `dir`. `temp` is reserved.
    pub fn with_prefix(mut self, prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        if prefix != TEMP && !prefix.is_empty() {
            let _ = self.prefixes.insert(prefix, dir.into());
        }
        self
    }

    /// Expand references in the top-level string values of `args`, in place.
    #[instrument(skip(self, args), fields(conversation_id = %conversation_id))]
    pub fn resolve_args(
        &self,
        conversation_id: &ConversationId,
        args: &mut ToolArgs,
    ) -> Result<(), ResolveError> {
        for (key, value) in args.iter_mut() {
            let Value::String(raw) = value else { continue };
            if let Some(resolved) = self.resolve_value(conversation_id, raw)? {
                debug!(key = %key, bytes = resolved.len(), "argument expanded");
                *raw = resolved;
            }
        }
        Ok(())
    }

    /// Expansion of a single value, or `None` when it stays as written.
    pub fn resolve_value(
        &self,
        conversation_id: &ConversationId,
        raw: &str,
    ) -> Result<Option<String>, ResolveError> {
        if raw.chars().any(char::is_whitespace) {
            return Ok(None);
        }
        let Some((prefix, rest)) = raw.split_once(':') else {
            return Ok(None);
        };
        if prefix == TEMP {
            return self.resolve_temp(conversation_id, rest);
        }
        Ok(self
            .prefixes
            .get(prefix)
            .and_then(|dir| read_under(dir, rest)))
    }

    fn resolve_temp(
        &self,
        conversation_id: &ConversationId,
        label: &str,
    ) -> Result<Option<String>, ResolveError> {
        if label.is_empty() {
            return Ok(None);
        }
        match self.temp.read(conversation_id, label) {
            Ok(content) => Ok(Some(content)),
            Err(TempFileError::UnknownLabel(_)) => Err(ResolveError::UnknownTempLabel {
                label: label.to_string(),
            }),
            Err(TempFileError::Io { path, source }) => Err(ResolveError::TempUnreadable {
                label: label.to_string(),
                path,
                detail: source.to_string(),
            }),
            Err(TempFileError::Store(e)) => Err(ResolveError::Store(e)),
            Err(TempFileError::InvalidLabel(_)) => Err(ResolveError::UnknownTempLabel {
                label: label.to_string(),
            }),
        }
    }
}

/// Contents of `dir/rel`, or `None` when the path escapes `dir`, is missing
/// or unreadable.
fn read_under(dir: &Path, rel: &str) -> Option<String> {
    let rel = Path::new(rel);
    if rel.as_os_str().is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    let path = dir.join(rel);
    match std::fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "path reference left unresolved");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_store::Database;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        resolver: ContentResolver,
        temp: TempFileStore,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let temp = TempFileStore::new(Database::in_memory().unwrap(), dir.path().join("temp"));
        let kb = dir.path().join("kb");
        std::fs::create_dir_all(kb.join("notes")).unwrap();
        std::fs::write(kb.join("notes/boiler.md"), "boiler manual").unwrap();
        let resolver = ContentResolver::new(temp.clone()).with_prefix("kb", kb);
        Fixture { resolver, temp, dir }
    }

    fn conv() -> ConversationId {
        ConversationId::from_raw("c1")
    }

    fn args(v: Value) -> ToolArgs {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn temp_label_resolves_and_unknown_fails() {
        let f = fixture();
        f.temp.create(&conv(), "draft", "X").unwrap();

        let mut a = args(json!({"body": "temp:draft"}));
        f.resolver.resolve_args(&conv(), &mut a).unwrap();
        assert_eq!(a["body"], "X");

        let mut a = args(json!({"body": "temp:unknown"}));
        let err = f.resolver.resolve_args(&conv(), &mut a).unwrap_err();
        assert!(err.to_string().contains("unknown temp label"), "{err}");
    }

    #[test]
    fn labels_are_scoped_to_the_conversation() {
        let f = fixture();
        f.temp.create(&conv(), "draft", "X").unwrap();
        let mut a = args(json!({"body": "temp:draft"}));
        let other = ConversationId::from_raw("c2");
        assert!(matches!(
            f.resolver.resolve_args(&other, &mut a),
            Err(ResolveError::UnknownTempLabel { .. })
        ));
    }

    #[test]
    fn unreadable_temp_file_is_hard_error() {
        let f = fixture();
        let path = f.temp.create(&conv(), "gone", "X").unwrap();
        std::fs::remove_file(path).unwrap();
        let mut a = args(json!({"body": "temp:gone"}));
        assert!(matches!(
            f.resolver.resolve_args(&conv(), &mut a),
            Err(ResolveError::TempUnreadable { .. })
        ));
    }

    #[test]
    fn values_that_are_not_whole_references_stay() {
        let f = fixture();
        f.temp.create(&conv(), "draft", "X").unwrap();
        let mut a = args(json!({
            "empty": "temp:",
            "sentence": "see temp:draft",
            "url": "https://example.com",
            "count": 3,
            "nested": {"body": "temp:draft"},
            "list": ["temp:draft"],
        }));
        let before = a.clone();
        f.resolver.resolve_args(&conv(), &mut a).unwrap();
        assert_eq!(a, before);
    }

    #[test]
    fn path_prefixes_pass_through_on_failure() {
        let f = fixture();
        let mut a = args(json!({
            "found": "kb:notes/boiler.md",
            "missing": "kb:notes/absent.md",
            "escape": "kb:../temp",
            "unconfigured": "scratchpad:plan.md",
        }));
        f.resolver.resolve_args(&conv(), &mut a).unwrap();
        assert_eq!(a["found"], "boiler manual");
        assert_eq!(a["missing"], "kb:notes/absent.md");
        assert_eq!(a["escape"], "kb:../temp");
        assert_eq!(a["unconfigured"], "scratchpad:plan.md");
        drop(f.dir);
    }

    #[test]
    fn temp_prefix_cannot_be_rebound() {
        let f = fixture();
        let resolver = f.resolver.clone().with_prefix("temp", f.dir.path());
        let mut a = args(json!({"body": "temp:nothing"}));
        assert!(resolver.resolve_args(&conv(), &mut a).is_err());
    }
}
