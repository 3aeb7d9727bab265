//! Context blocks injected into the model's system prompt.

pub mod episodic;

pub use episodic::{EpisodicConfig, EpisodicProvider};
