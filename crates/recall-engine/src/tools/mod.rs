//! Built-in tools backed by the archive, the temp store and the capability
//! manager.

pub mod capability;
pub mod search_history;
pub mod temp;

use std::sync::Arc;

use recall_store::ArchiveStore;

use crate::capability::CapabilityManager;
use crate::registry::ToolRegistry;
use crate::temp_store::TempFileStore;
use crate::tool::typed;

/// Register every built-in tool.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    archive: ArchiveStore,
    temp: TempFileStore,
    capabilities: Arc<CapabilityManager>,
    search: search_history::SearchHistoryConfig,
) {
    registry.register(typed(search_history::SearchHistoryTool::new(archive, search)));
    registry.register(typed(temp::SaveTempTool::new(temp.clone())));
    registry.register(typed(temp::ListTempTool::new(temp)));
    registry.register(typed(capability::RequestCapabilityTool::new(Arc::clone(&capabilities))));
    registry.register(typed(capability::DropCapabilityTool::new(capabilities)));
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::capability::{DROP_CAPABILITY, REQUEST_CAPABILITY};
    use recall_store::Database;

    #[test]
    fn builtins_are_registered() {
        let db = Database::in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new();
        register_builtin_tools(
            &mut registry,
            ArchiveStore::new(db.clone()),
            TempFileStore::new(db, dir.path()),
            Arc::new(CapabilityManager::new(HashMap::new(), Vec::new())),
            search_history::SearchHistoryConfig::default(),
        );
        assert_eq!(
            registry.names(),
            vec![
                DROP_CAPABILITY,
                "list_temp",
                REQUEST_CAPABILITY,
                "save_temp",
                "search_history"
            ]
        );
        assert!(registry.get("save_temp").unwrap().skip_content_resolve());
        assert!(!registry.get("search_history").unwrap().skip_content_resolve());
    }
}
