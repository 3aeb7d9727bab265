//! # recall-engine
//!
//! Components that sit between the agent loop and the archive:
//!
//! - [`ToolRegistry`]: named tools, tag filtering, dispatch with argument resolution
//! - [`CapabilityManager`]: per-session activation of tool groups
//! - [`ContentResolver`] and [`TempFileStore`]: pass large blobs by reference
//! - [`EpisodicProvider`]: token-bounded recent-history block for the system prompt
//! - [`Summarizer`]: background metadata backfill and orphan recovery

#![deny(unsafe_code)]

pub mod capability;
pub mod context;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod summarizer;
pub mod temp_store;
pub mod tool;
pub mod tools;

pub use capability::CapabilityManager;
pub use context::{EpisodicConfig, EpisodicProvider};
pub use error::{
    CapabilityError, RegistryError, ResolveError, SummarizerError, TempFileError, ToolError,
};
pub use registry::{TagIndex, ToolRegistry};
pub use resolver::ContentResolver;
pub use summarizer::{Summarizer, SummarizerConfig, SummarizerHandle};
pub use temp_store::TempFileStore;
pub use tool::{typed, Tool, ToolArgs, ToolContext, ToolSchema, TypedTool};
pub use tools::register_builtin_tools;
