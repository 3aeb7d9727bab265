//! Tool contract.
//!
//! Handlers receive the JSON-decoded argument map after content
//! resolution. [`TypedTool`] is the preferred way to write a handler: the
//! [`Typed`] adapter decodes the map into a parameter struct and reports
//! `InvalidArguments` when it does not fit.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use recall_core::ids::{ConversationId, SessionId};

use crate::error::ToolError;

/// Top-level tool arguments.
pub type ToolArgs = serde_json::Map<String, Value>;

/// Context available to tools during execution.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
    pub session_id: Option<SessionId>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            session_id: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Function-schema shape sent to the model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionSchema,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Trait implemented by each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    /// Tools that store raw text (rather than consume it) opt out of
    /// `temp:`/path expansion.
    fn skip_content_resolve(&self) -> bool {
        false
    }

    async fn execute(&self, args: ToolArgs, ctx: &ToolContext) -> Result<String, ToolError>;

    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            kind: "function",
            function: FunctionSchema {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }
}

/// Handler with a declared parameter struct.
#[async_trait]
pub trait TypedTool: Send + Sync {
    type Args: DeserializeOwned + Send;

    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    fn skip_content_resolve(&self) -> bool {
        false
    }

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<String, ToolError>;
}

/// Adapts a [`TypedTool`] to the untyped [`Tool`] contract.
pub struct Typed<T>(pub T);

/// Wrap a typed handler for registration.
pub fn typed<T: TypedTool + 'static>(tool: T) -> Arc<dyn Tool> {
    Arc::new(Typed(tool))
}

#[async_trait]
impl<T: TypedTool> Tool for Typed<T> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn parameters_schema(&self) -> Value {
        self.0.parameters_schema()
    }

    fn skip_content_resolve(&self) -> bool {
        self.0.skip_content_resolve()
    }

    async fn execute(&self, args: ToolArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        let args: T::Args = serde_json::from_value(Value::Object(args))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        self.0.call(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
        #[serde(default)]
        times: Option<usize>,
    }

    struct Echo;

    #[async_trait]
    impl TypedTool for Echo {
        type Args = EchoArgs;

        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Repeat text"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "required": ["text"]})
        }
        async fn call(&self, args: EchoArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
            Ok(args.text.repeat(args.times.unwrap_or(1)))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(ConversationId::from_raw("c"))
    }

    #[tokio::test]
    async fn typed_adapter_decodes_args() {
        let tool = typed(Echo);
        let args = json!({"text": "ab", "times": 2});
        let Value::Object(map) = args else { unreachable!() };
        assert_eq!(tool.execute(map, &ctx()).await.unwrap(), "abab");
    }

    #[tokio::test]
    async fn typed_adapter_rejects_bad_args() {
        let tool = typed(Echo);
        let err = tool.execute(ToolArgs::new(), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn schema_wire_shape() {
        let schema = typed(Echo).to_schema();
        let wire = serde_json::to_value(&schema).unwrap();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "echo");
        assert_eq!(wire["function"]["description"], "Repeat text");
        assert_eq!(wire["function"]["parameters"]["required"][0], "text");
    }
}
