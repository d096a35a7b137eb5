use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::collection::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_SIZE_MB};

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> u32 {
    DEFAULT_CHUNK_OVERLAP
}

fn default_max_size_mb() -> u32 {
    DEFAULT_MAX_SIZE_MB
}

fn default_worker_threads() -> usize {
    2
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Settings for the collection subsystem, stored as `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSettings {
    /// Where `collections.db` lives; the platform data directory when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u32,
    #[serde(default = "default_chunk_overlap")]
    pub default_chunk_overlap: u32,
    #[serde(default = "default_max_size_mb")]
    pub default_max_size_mb: u32,
    /// Look up matching checksums in other collections when adding files
    #[serde(default = "default_true")]
    pub check_duplicates: bool,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_chunk_size: default_chunk_size(),
            default_chunk_overlap: default_chunk_overlap(),
            default_max_size_mb: default_max_size_mb(),
            check_duplicates: true,
            worker_threads: default_worker_threads(),
            log_filter: default_log_filter(),
        }
    }
}
