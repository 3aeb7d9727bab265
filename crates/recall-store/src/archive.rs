use std::sync::Arc;

use chrono::{DateTime, Utc};

use recall_core::{Clock, SystemClock};

use crate::database::Database;

/// Owner of all durable session state.
///
/// Operations are split across `sessions`, `messages`, `search`, `imports`
/// and `export`; each adds an `impl ArchiveStore` block.
#[derive(Clone)]
pub struct ArchiveStore {
    pub(crate) db: Database,
    pub(crate) clock: Arc<dyn Clock>,
}

impl ArchiveStore {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for ArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStore")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}
