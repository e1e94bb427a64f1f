// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the vault database | `pwkDB` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::str::FromStr;

use crate::storage::paths::{StoragePaths, DATA_ROOT};

/// Environment variable name for the vault data directory.
///
/// # Default
/// `pwkDB`, relative to the working directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, for log aggregation.
    Json,
    /// Human-readable, for development.
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub paths: StoragePaths,
    pub log_format: LogFormat,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            paths: StoragePaths::new(DATA_ROOT),
            log_format: LogFormat::default(),
        }
    }
}

impl VaultConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unknown log formats fall
    /// back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let paths = lookup(DATA_DIR_ENV)
            .filter(|dir| !dir.is_empty())
            .map(StoragePaths::new)
            .unwrap_or_default();
        let log_format = lookup(LOG_FORMAT_ENV)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();

        Self { paths, log_format }
    }
}
