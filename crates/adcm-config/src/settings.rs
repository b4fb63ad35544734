//! Engine settings
//!
//! A single value injected into [`crate::ConfigManager`] at construction.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default size cap of bundle-supplied file defaults, in bytes
pub const DEFAULT_FILE_SIZE_CAP: usize = 2048;

/// Default number of prototype schemas kept in memory
pub const DEFAULT_SCHEMA_CACHE_CAPACITY: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory of materialized file and secretfile values
    pub file_dir: PathBuf,
    /// Root of unpacked bundles, one subdirectory per bundle hash
    pub bundle_dir: PathBuf,
    /// Base64 encoded 256-bit vault key
    pub vault_key: String,
    pub file_size_cap: usize,
    pub schema_cache_capacity: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            file_dir: PathBuf::from("data/file"),
            bundle_dir: PathBuf::from("data/bundle"),
            vault_key: String::new(),
            file_size_cap: DEFAULT_FILE_SIZE_CAP,
            schema_cache_capacity: DEFAULT_SCHEMA_CACHE_CAPACITY,
        }
    }
}

impl EngineSettings {
    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = dir.into();
        self
    }

    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = dir.into();
        self
    }

    pub fn with_vault_key(mut self, key: impl Into<String>) -> Self {
        self.vault_key = key.into();
        self
    }
}
