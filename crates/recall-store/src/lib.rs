//! Durable session archive.
//!
//! [`ArchiveStore`] is the only writer of session, message, tool-call and
//! import rows. Other components read through [`ArchiveReader`].

pub mod archive;
pub mod database;
pub mod error;
pub mod export;
pub mod imports;
pub mod messages;
pub mod reader;
pub mod row_helpers;
pub mod schema;
pub mod search;
pub mod sessions;
pub mod temp_files;
pub mod types;

pub use archive::ArchiveStore;
pub use database::Database;
pub use error::StoreError;
pub use imports::{ImportedCounts, SessionImport};
pub use reader::{ArchiveReader, SummaryStore};
pub use search::{SearchOptions, SearchResult};
pub use temp_files::{TempFileRecord, TempFileRepo};
pub use types::{
    ArchivedMessage, ArchivedToolCall, EndReason, Role, Session, SessionMetadata,
};
