use std::path::PathBuf;

use recall_core::llm::LlmError;
use recall_store::StoreError;

/// Errors returned by tool handlers.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("cancelled")]
    Cancelled,
}

/// Failures of `temp:` reference expansion. Path-prefix references never
/// fail; they pass through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown temp label {label:?}")]
    UnknownTempLabel { label: String },
    #[error("temp label {label:?} at {} is unreadable: {detail}", path.display())]
    TempUnreadable {
        label: String,
        path: PathBuf,
        detail: String,
    },
    #[error("temp label lookup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The tool is not in the current capability set. The agent loop must
    /// not retry.
    #[error("tool unavailable: {name}")]
    ToolUnavailable { name: String },
    #[error("invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: String, detail: String },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl RegistryError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ToolUnavailable { .. })
    }

    /// Tool-result text injected in place of a result when the model called a
    /// tool outside its current capability set.
    pub fn unavailable_notice(&self) -> Option<String> {
        match self {
            Self::ToolUnavailable { name } => Some(format!(
                "Tool `{name}` is not available in this session. Do not call it again. \
                 Use request_capability to enable it, delegate the task, or tell the user \
                 it cannot be done right now."
            )),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("unknown capability {0:?}")]
    UnknownTag(String),
    #[error("capability {0:?} is always active and cannot be dropped")]
    AlwaysActive(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TempFileError {
    #[error("invalid temp label {0:?}: use 1-63 characters from [A-Za-z0-9_-], starting alphanumeric")]
    InvalidLabel(String),
    #[error("unknown temp label {0:?}")]
    UnknownLabel(String),
    #[error("temp file IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-session summarization failure. Always logged and skipped; the
/// session stays eligible for the next scan.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("session {0} has no non-system messages")]
    EmptyTranscript(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_label_message() {
        let err = ResolveError::UnknownTempLabel {
            label: "draft".into(),
        };
        assert!(err.to_string().contains("unknown temp label"));

        let wrapped = RegistryError::from(err);
        assert!(wrapped.to_string().contains("unknown temp label"));
        assert!(!wrapped.is_unavailable());
        assert!(wrapped.unavailable_notice().is_none());
    }

    #[test]
    fn unavailable_is_distinguishable() {
        let err = RegistryError::ToolUnavailable {
            name: "send_email".into(),
        };
        assert!(err.is_unavailable());
        assert!(err.unavailable_notice().unwrap().contains("send_email"));

        let handler = RegistryError::from(ToolError::ExecutionFailed("boom".into()));
        assert!(!handler.is_unavailable());
    }
}
