//! # recall-core
//!
//! Shared vocabulary for the recall crates: branded ids, the injectable
//! clock, token estimation and text helpers, the language-model collaborator
//! contracts, and typed settings.

#![deny(unsafe_code)]

pub mod clock;
pub mod ids;
pub mod llm;
pub mod settings;
pub mod text;

pub use clock::{Clock, FixedClock, SystemClock};
pub use text::estimate_tokens;
