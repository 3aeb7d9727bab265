//! Scripted completion backend and router for deterministic tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CompletionProvider, CompletionRequest, LlmError, ModelRouter, RouteHints};

/// Pre-programmed responses, consumed in order.
pub enum MockResponse {
    Text(String),
    Error(LlmError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Provider that replays [`MockResponse`]s and records every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().push(request.clone());
        let mut next = self.responses.lock().pop_front();
        loop {
            match next {
                None => {
                    return Err(LlmError::Request(
                        "ScriptedProvider: no response configured".into(),
                    ))
                }
                Some(MockResponse::Text(text)) => return Ok(text),
                Some(MockResponse::Error(e)) => return Err(e),
                Some(MockResponse::Delay(delay, inner)) => {
                    tokio::time::sleep(delay).await;
                    next = Some(*inner);
                }
            }
        }
    }
}

/// Router that always hands out one provider and remembers the hints it saw.
pub struct StaticRouter {
    provider: Option<Arc<dyn CompletionProvider>>,
    seen: Mutex<Vec<RouteHints>>,
}

impl StaticRouter {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider: Some(provider),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Router with no backend; every selection fails.
    pub fn empty() -> Self {
        Self {
            provider: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_hints(&self) -> Vec<RouteHints> {
        self.seen.lock().clone()
    }
}

impl ModelRouter for StaticRouter {
    fn select(&self, hints: &RouteHints) -> Result<Arc<dyn CompletionProvider>, LlmError> {
        self.seen.lock().push(hints.clone());
        self.provider
            .clone()
            .ok_or_else(|| LlmError::Unavailable("no provider configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn replays_in_order() {
        let provider = ScriptedProvider::new(vec![
            MockResponse::text("one"),
            MockResponse::Error(LlmError::Cancelled),
        ]);
        assert_eq!(provider.complete(&request("a")).await.unwrap(), "one");
        assert!(matches!(
            provider.complete(&request("b")).await,
            Err(LlmError::Cancelled)
        ));
        assert!(provider.complete(&request("c")).await.is_err());
        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.requests()[1].messages[0].content, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response_waits() {
        let provider = ScriptedProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(30),
            MockResponse::text("late"),
        )]);
        let start = tokio::time::Instant::now();
        assert_eq!(provider.complete(&request("x")).await.unwrap(), "late");
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[test]
    fn router_records_hints() {
        let router = StaticRouter::new(Arc::new(ScriptedProvider::new(vec![])));
        let provider = router.select(&RouteHints::background(None)).unwrap();
        assert_eq!(provider.name(), "mock");
        assert_eq!(router.seen_hints().len(), 1);

        let empty = StaticRouter::empty();
        assert!(matches!(
            empty.select(&RouteHints::background(None)),
            Err(LlmError::Unavailable(_))
        ));
    }
}
