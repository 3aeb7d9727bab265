//! Language-model collaborator contracts.
//!
//! The HTTP clients live outside this workspace. Background jobs only need a
//! single non-streaming completion, routed through a model selector that
//! knows which backends are local and how good they are.

pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors surfaced by completion backends and the router.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LlmError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("no model available: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Transient failures the next periodic tick may succeed on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_) | Self::Request(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Unavailable(_) => "unavailable",
            Self::Request(_) => "request",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A single non-streaming completion request.
#[derive(Clone, Debug, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// Implemented by each completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// What a caller needs from the model it is about to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mission {
    Interactive,
    Background,
    Delegate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteHints {
    pub mission: Mission,
    pub local_only: bool,
    /// Minimum acceptable quality score, 0-10.
    pub quality_floor: u8,
    /// Explicit model name to prefer when it satisfies the other hints.
    pub preference: Option<String>,
}

impl RouteHints {
    /// Hints for low-priority background jobs: local models only, decent quality.
    pub fn background(preference: Option<String>) -> Self {
        Self {
            mission: Mission::Background,
            local_only: true,
            quality_floor: 7,
            preference,
        }
    }
}

/// Picks a completion backend for a set of hints.
pub trait ModelRouter: Send + Sync {
    fn select(&self, hints: &RouteHints) -> Result<Arc<dyn CompletionProvider>, LlmError>;
}
