//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a host
//! process can deserialize partial JSON; missing fields take the production
//! defaults below. Reading files and environment overrides is left to the
//! host.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings for the memory core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecallSettings {
    pub archive: ArchiveSettings,
    pub episodic: EpisodicSettings,
    pub summarizer: SummarizerSettings,
    pub temp_files: TempFileSettings,
    pub resolver: ResolverSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveSettings {
    pub db_path: PathBuf,
    /// Silence gap bounding search-hit context.
    pub search_silence_minutes: u32,
    pub search_limit: u32,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            db_path: recall_home().join("archive.db"),
            search_silence_minutes: 10,
            search_limit: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EpisodicSettings {
    /// IANA timezone name used for timestamps and daily-note dates.
    pub timezone: String,
    pub daily_notes_dir: Option<PathBuf>,
    pub lookback_days: u32,
    pub token_budget: usize,
    /// Silence gap between sessions that earns a gap marker. Distinct from
    /// the search context gap.
    pub silence_gap_minutes: u32,
    pub max_sessions: u32,
}

impl Default for EpisodicSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            daily_notes_dir: None,
            lookback_days: 2,
            token_budget: 4000,
            silence_gap_minutes: 30,
            max_sessions: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarizerSettings {
    pub interval_secs: u64,
    pub batch_size: u32,
    pub pause_between_secs: u64,
    pub call_timeout_secs: u64,
    pub model_preference: Option<String>,
    pub max_transcript_bytes: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            batch_size: 10,
            pause_between_secs: 5,
            call_timeout_secs: 60,
            model_preference: None,
            max_transcript_bytes: 8000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TempFileSettings {
    pub base_dir: PathBuf,
}

impl Default for TempFileSettings {
    fn default() -> Self {
        Self {
            base_dir: recall_home().join("temp"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolverSettings {
    /// Reference prefix (without the colon) to the directory it resolves into.
    pub path_prefixes: BTreeMap<String, PathBuf>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        let home = recall_home();
        let mut path_prefixes = BTreeMap::new();
        path_prefixes.insert("kb".to_string(), home.join("kb"));
        path_prefixes.insert("scratchpad".to_string(), home.join("scratchpad"));
        Self { path_prefixes }
    }
}

/// `$HOME/.recall`, or `/tmp/.recall` when HOME is unset.
pub fn recall_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".recall")
}
