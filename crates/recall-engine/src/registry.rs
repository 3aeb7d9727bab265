use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{RegistryError, ToolError};
use crate::resolver::ContentResolver;
use crate::tool::{Tool, ToolArgs, ToolContext, ToolSchema};

/// Tag name to the tool names it exposes.
pub type TagIndex = HashMap<String, Vec<String>>;

/// Registry of available tools.
///
/// Treated as immutable once an agent loop starts using it. Filtered copies
/// are independent values: they copy the map and share the tool
/// descriptors.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    tag_index: Option<TagIndex>,
    resolver: Option<ContentResolver>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand `temp:`/path references before handlers run.
    pub fn with_resolver(mut self, resolver: ContentResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Add or replace a tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let _ = self.tools.insert(name, tool);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Function schemas for the model, sorted by name.
    pub fn list(&self) -> Vec<ToolSchema> {
        let mut defs: Vec<ToolSchema> = self.tools.values().map(|t| t.to_schema()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn set_tag_index(&mut self, index: TagIndex) {
        self.tag_index = Some(index);
    }

    pub fn tag_index(&self) -> Option<&TagIndex> {
        self.tag_index.as_ref()
    }

    /// Decode `args_json`, expand references unless the tool opts out, and
    /// run the handler.
    ///
    /// An unregistered name yields [`RegistryError::ToolUnavailable`], which
    /// callers must treat as "do not retry".
    #[instrument(skip(self, ctx, args_json), fields(tool = %name, conversation_id = %ctx.conversation_id))]
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        name: &str,
        args_json: &str,
    ) -> Result<String, RegistryError> {
        let tool = self.get(name).ok_or_else(|| RegistryError::ToolUnavailable {
            name: name.to_string(),
        })?;

        let mut args = decode_args(name, args_json)?;
        if !tool.skip_content_resolve() {
            if let Some(resolver) = &self.resolver {
                resolver.resolve_args(&ctx.conversation_id, &mut args)?;
            }
        }

        if ctx.cancel.is_cancelled() {
            return Err(ToolError::Cancelled.into());
        }
        let out = tool.execute(args, ctx).await?;
        debug!(bytes = out.len(), "tool executed");
        Ok(out)
    }

    /// Copy containing only tools that belong to at least one of `tags`.
    /// An empty tag list or a missing index returns a full copy.
    pub fn filter_by_tags(&self, tags: &[String]) -> Self {
        let Some(index) = self.tag_index.as_ref().filter(|_| !tags.is_empty()) else {
            return self.clone();
        };
        let allowed: HashSet<&str> = tags
            .iter()
            .filter_map(|tag| index.get(tag))
            .flatten()
            .map(String::as_str)
            .collect();
        self.retain(|name| allowed.contains(name))
    }

    /// Copy containing only the named tools.
    pub fn filtered_copy(&self, names: &[&str]) -> Self {
        let keep: HashSet<&str> = names.iter().copied().collect();
        self.retain(|name| keep.contains(name))
    }

    /// Copy without the named tools.
    pub fn filtered_copy_excluding(&self, names: &[&str]) -> Self {
        let drop: HashSet<&str> = names.iter().copied().collect();
        self.retain(|name| !drop.contains(name))
    }

    fn retain(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|(name, _)| keep(name.as_str()))
                .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
                .collect(),
            tag_index: self.tag_index.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

fn decode_args(tool: &str, args_json: &str) -> Result<ToolArgs, RegistryError> {
    if args_json.trim().is_empty() {
        return Ok(ToolArgs::new());
    }
    match serde_json::from_str::<Value>(args_json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(ToolArgs::new()),
        Ok(other) => Err(RegistryError::InvalidArguments {
            tool: tool.to_string(),
            detail: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Err(RegistryError::InvalidArguments {
            tool: tool.to_string(),
            detail: e.to_string(),
        }),
    }
}
