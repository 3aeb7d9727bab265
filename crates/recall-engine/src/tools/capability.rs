use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::capability::{CapabilityManager, DROP_CAPABILITY, REQUEST_CAPABILITY};
use crate::error::{CapabilityError, ToolError};
use crate::tool::{ToolContext, TypedTool};

#[derive(Debug, Deserialize)]
pub struct CapabilityArgs {
    pub tag: String,
}

fn tag_schema(manager: &CapabilityManager, what: &str) -> Value {
    json!({
        "type": "object",
        "required": ["tag"],
        "properties": {
            "tag": {
                "type": "string",
                "enum": manager.togglable(),
                "description": what
            }
        }
    })
}

fn to_tool_error(manager: &CapabilityManager, e: CapabilityError) -> ToolError {
    match e {
        CapabilityError::UnknownTag(tag) => ToolError::InvalidArguments(format!(
            "unknown capability {tag:?}; available: {}",
            manager.togglable().join(", ")
        )),
        other => ToolError::InvalidArguments(other.to_string()),
    }
}

pub struct RequestCapabilityTool {
    manager: Arc<CapabilityManager>,
}

impl RequestCapabilityTool {
    pub fn new(manager: Arc<CapabilityManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl TypedTool for RequestCapabilityTool {
    type Args = CapabilityArgs;

    fn name(&self) -> &str {
        REQUEST_CAPABILITY
    }

    fn description(&self) -> &str {
        "Enable a group of tools for the rest of this session."
    }

    fn parameters_schema(&self) -> Value {
        tag_schema(&self.manager, "Capability to enable")
    }

    async fn call(&self, args: CapabilityArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
        let tools = self
            .manager
            .activate(&args.tag)
            .map_err(|e| to_tool_error(&self.manager, e))?;
        Ok(format!(
            "Capability `{}` is active. Tools available from the next turn: {}",
            args.tag,
            tools.join(", ")
        ))
    }
}

pub struct DropCapabilityTool {
    manager: Arc<CapabilityManager>,
}

impl DropCapabilityTool {
    pub fn new(manager: Arc<CapabilityManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl TypedTool for DropCapabilityTool {
    type Args = CapabilityArgs;

    fn name(&self) -> &str {
        DROP_CAPABILITY
    }

    fn description(&self) -> &str {
        "Disable a group of tools that is no longer needed."
    }

    fn parameters_schema(&self) -> Value {
        tag_schema(&self.manager, "Capability to disable")
    }

    async fn call(&self, args: CapabilityArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
        let was_active = self
            .manager
            .drop_tag(&args.tag)
            .map_err(|e| to_tool_error(&self.manager, e))?;
        Ok(if was_active {
            format!("Capability `{}` dropped.", args.tag)
        } else {
            format!("Capability `{}` was not active.", args.tag)
        })
    }
}
