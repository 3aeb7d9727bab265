//! # recall-import
//!
//! Bulk import of OpenClaw JSONL transcripts into the recall archive. Each
//! transcript file becomes one closed session; the imports table keeps
//! repeated runs from importing a file twice.

#![deny(unsafe_code)]

pub mod error;
pub mod importer;
pub mod parser;

pub use error::ImportError;
pub use importer::{FileOutcome, ImportSummary, OpenClawImporter, SOURCE_TYPE};
