//! Construction-time configuration, supplied by the embedding process. This crate never reads
//! files or environment variables on its own behalf — that's the embedding process's job.

use std::path::{Path, PathBuf};

/// Options recognized by [`crate::facade::CheckpointStore::open`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Determines the default store directory.
    pub rollup_address: [u8; 20],
    /// Bootstraps [`crate::facade::CheckpointStore::initial_machine`] for a fresh store.
    pub code_file_path: Option<PathBuf>,
    /// Overrides the default store directory; `None` or empty means use the default.
    pub database_path: Option<PathBuf>,
    /// Advisory bound on reorg depth; stored but not enforced by this crate.
    pub max_reorg_depth: u64,
    /// If set, the resolved store directory is removed before opening. Consumed exactly once at
    /// construction. Intended for tests only — this is a destructive operation.
    pub force_fresh_start: bool,
}

impl StoreConfig {
    pub fn new(rollup_address: [u8; 20]) -> Self {
        Self {
            rollup_address,
            code_file_path: None,
            database_path: None,
            max_reorg_depth: 0,
            force_fresh_start: false,
        }
    }

    pub fn with_code_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.code_file_path = Some(path.into());
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_max_reorg_depth(mut self, depth: u64) -> Self {
        self.max_reorg_depth = depth;
        self
    }

    pub fn with_force_fresh_start(mut self, fresh: bool) -> Self {
        self.force_fresh_start = fresh;
        self
    }

    /// Resolves the on-disk store directory: `database_path` if set and non-empty, else
    /// `<base>/<rollup_address_hex_lowercase_no_0x>`.
    pub fn resolve_store_dir(&self, base: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => base.join(hex::encode(self.rollup_address)),
        }
    }
}
