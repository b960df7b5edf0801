//! Configuration for cowkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a cowkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the single store file
    /// Internal structure:
    ///   page 0, 1   meta slots (alternating commits)
    ///   page 2      initial free-list node
    ///   page 3..    B+tree and free-list pages
    pub path: PathBuf,

    /// Create the store file if it does not exist
    pub create_if_missing: bool,

    // -------------------------------------------------------------------------
    // Commit Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: whether commits fsync
    pub sync_mode: SyncMode,
}

/// Commit sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync data pages, then the meta page, on every commit (crash safe)
    EveryCommit,

    /// never fsync (fast bulk loads; a crash may lose recent commits)
    Never,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./cowkv.db"),
            create_if_missing: true,
            sync_mode: SyncMode::EveryCommit,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set whether a missing store file is created on open
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Set the commit sync strategy
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
