use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{TempFileError, ToolError};
use crate::temp_store::TempFileStore;
use crate::tool::{ToolContext, TypedTool};

fn to_tool_error(e: TempFileError) -> ToolError {
    match e {
        TempFileError::InvalidLabel(_) => ToolError::InvalidArguments(e.to_string()),
        other => ToolError::ExecutionFailed(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveTempArgs {
    pub label: String,
    pub content: String,
}

/// Stores text under a label so later calls can pass `temp:LABEL`.
pub struct SaveTempTool {
    store: TempFileStore,
}

impl SaveTempTool {
    pub fn new(store: TempFileStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for SaveTempTool {
    type Args = SaveTempArgs;

    fn name(&self) -> &str {
        "save_temp"
    }

    fn description(&self) -> &str {
        "Save text under a short label. Pass `temp:LABEL` as any later tool argument \
         instead of repeating the text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["label", "content"],
            "properties": {
                "label": {
                    "type": "string",
                    "pattern": "^[A-Za-z0-9][A-Za-z0-9_-]{0,62}$",
                    "description": "Label to store the text under"
                },
                "content": {"type": "string", "description": "Text to store"}
            }
        })
    }

    // Content is stored verbatim; a literal `temp:x` value must not be expanded.
    fn skip_content_resolve(&self) -> bool {
        true
    }

    async fn call(&self, args: SaveTempArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        let _ = self
            .store
            .create(&ctx.conversation_id, &args.label, &args.content)
            .map_err(to_tool_error)?;
        Ok(format!(
            "Saved {} bytes as temp:{}",
            args.content.len(),
            args.label
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTempArgs {}

/// Lists the temp labels of the current conversation.
pub struct ListTempTool {
    store: TempFileStore,
}

impl ListTempTool {
    pub fn new(store: TempFileStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TypedTool for ListTempTool {
    type Args = ListTempArgs;

    fn name(&self) -> &str {
        "list_temp"
    }

    fn description(&self) -> &str {
        "List temp labels saved in this conversation."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn call(&self, _args: ListTempArgs, ctx: &ToolContext) -> Result<String, ToolError> {
        let labels = self
            .store
            .list(&ctx.conversation_id)
            .map_err(to_tool_error)?;
        if labels.is_empty() {
            return Ok("No temp labels in this conversation.".into());
        }
        Ok(labels
            .iter()
            .map(|(label, _)| format!("temp:{label}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::ids::ConversationId;
    use recall_store::Database;
    use tempfile::TempDir;

    use crate::registry::ToolRegistry;
    use crate::resolver::ContentResolver;
    use crate::tool::typed;

    fn setup() -> (ToolRegistry, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = TempFileStore::new(Database::in_memory().unwrap(), dir.path());
        let mut registry = ToolRegistry::new().with_resolver(ContentResolver::new(store.clone()));
        registry.register(typed(SaveTempTool::new(store.clone())));
        registry.register(typed(ListTempTool::new(store)));
        (registry, dir)
    }

    #[tokio::test]
    async fn save_then_list() {
        let (registry, _dir) = setup();
        let ctx = ToolContext::new(ConversationId::from_raw("c"));

        assert_eq!(registry.execute(&ctx, "list_temp", "").await.unwrap(),
            "No temp labels in this conversation.");

        let out = registry
            .execute(&ctx, "save_temp", r#"{"label":"notes","content":"temp:other"}"#)
            .await
            .unwrap();
        assert_eq!(out, "Saved 10 bytes as temp:notes");
        registry
            .execute(&ctx, "save_temp", r#"{"label":"b","content":"x"}"#)
            .await
            .unwrap();

        assert_eq!(
            registry.execute(&ctx, "list_temp", "{}").await.unwrap(),
            "temp:b\ntemp:notes"
        );
    }

    #[tokio::test]
    async fn bad_label_is_invalid_arguments() {
        let (registry, _dir) = setup();
        let ctx = ToolContext::new(ConversationId::from_raw("c"));
        let err = registry
            .execute(&ctx, "save_temp", r#"{"label":"../x","content":"y"}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::RegistryError::Tool(ToolError::InvalidArguments(_))
        ));
    }
}
