//! Per-session capability tags.
//!
//! A tag names a group of tools. Always-active tags are on for the whole
//! session; the rest can be requested and dropped by the model through the
//! `request_capability` and `drop_capability` tools, which belong to no tag
//! and are present in every derived registry.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use tracing::info;

use crate::error::CapabilityError;
use crate::registry::{TagIndex, ToolRegistry};

pub const REQUEST_CAPABILITY: &str = "request_capability";
pub const DROP_CAPABILITY: &str = "drop_capability";

pub struct CapabilityManager {
    index: TagIndex,
    always_active: BTreeSet<String>,
    active: Mutex<BTreeSet<String>>,
}

impl CapabilityManager {
    /// Always-active names missing from `index` are ignored.
    pub fn new(index: TagIndex, always_active: impl IntoIterator<Item = String>) -> Self {
        let always_active = always_active
            .into_iter()
            .filter(|tag| index.contains_key(tag))
            .collect();
        Self {
            index,
            always_active,
            active: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    pub fn always_active(&self) -> Vec<String> {
        self.always_active.iter().cloned().collect()
    }

    /// Tags the model may request or drop. Never contains an always-active tag.
    pub fn togglable(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .index
            .keys()
            .filter(|tag| !self.always_active.contains(*tag))
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    pub fn is_active(&self, tag: &str) -> bool {
        self.always_active.contains(tag) || self.active.lock().contains(tag)
    }

    /// Always-active tags followed by requested ones, sorted.
    pub fn active_tags(&self) -> Vec<String> {
        let active = self.active.lock();
        self.always_active
            .iter()
            .chain(active.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Turn a tag on. Returns the tools it exposes.
    pub fn activate(&self, tag: &str) -> Result<Vec<String>, CapabilityError> {
        let tools = self
            .index
            .get(tag)
            .ok_or_else(|| CapabilityError::UnknownTag(tag.to_string()))?;
        if !self.always_active.contains(tag) && self.active.lock().insert(tag.to_string()) {
            info!(tag, "capability activated");
        }
        Ok(tools.clone())
    }

    /// Turn a tag off. Returns whether it was on.
    pub fn drop_tag(&self, tag: &str) -> Result<bool, CapabilityError> {
        if self.always_active.contains(tag) {
            return Err(CapabilityError::AlwaysActive(tag.to_string()));
        }
        if !self.index.contains_key(tag) {
            return Err(CapabilityError::UnknownTag(tag.to_string()));
        }
        let removed = self.active.lock().remove(tag);
        if removed {
            info!(tag, "capability dropped");
        }
        Ok(removed)
    }

    /// Drop every requested tag.
    pub fn reset(&self) {
        self.active.lock().clear();
    }

    /// Registry exposing the active tags' tools plus the two capability
    /// tools.
    pub fn registry_for(&self, base: &ToolRegistry) -> ToolRegistry {
        let tags = self.active_tags();
        let mut derived = if tags.is_empty() {
            base.filtered_copy(&[])
        } else {
            let mut tagged = base.clone();
            tagged.set_tag_index(self.index.clone());
            tagged.filter_by_tags(&tags)
        };
        for name in [REQUEST_CAPABILITY, DROP_CAPABILITY] {
            if let Some(tool) = base.get(name) {
                derived.register(tool);
            }
        }
        derived
    }
}
