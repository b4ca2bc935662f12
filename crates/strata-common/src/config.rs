//! Configuration types for Strata
//!
//! This module defines configuration structures shared by the library
//! crates and the command-line front end.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding a store inside a working directory
pub const DAT_DIR: &str = ".dat";

/// Database file name inside [`DAT_DIR`]
pub const DB_FILE: &str = "db";

/// On-disk location of the store for a working directory: `<dir>/.dat/db`
#[must_use]
pub fn store_path(dir: &Path) -> PathBuf {
    dir.join(DAT_DIR).join(DB_FILE)
}

/// Root configuration for Strata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Stream configuration
    pub streams: StreamConfig,
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Create `<dir>/.dat` when it does not exist yet
    pub create_if_missing: bool,
    /// When appended nodes become durable
    pub sync_mode: SyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            sync_mode: SyncMode::OnFlush,
        }
    }
}

/// Log synchronization mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Sync every append (safest, slowest)
    OnCommit,
    /// Sync on explicit flush (appends are durable once flushed)
    OnFlush,
}

/// Stream configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Items buffered between a storage scan and its consumer
    pub buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}
