// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the on-disk layout.

use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory.
pub const DATA_ROOT: &str = "pwkDB";

/// File name of the redb database inside the data directory.
pub const DB_FILE: &str = "vault.redb";

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all vault data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the byte store holding every tree version and the commitment.
    pub fn db_file(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }
}
