// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passwerk - Replicated Credential Vault
//!
//! Stores encrypted credentials in content-addressed trees whose root hash is
//! the replicated state commitment. Mutations arrive as transactions from an
//! external consensus transport; reads are served from point-in-time
//! snapshots.
//!
//! ## Modules
//!
//! - `crypto` - Hashing, AEAD, key derivation from master credentials
//! - `storage` - Byte store, content trees, credential records
//! - `transaction` - Wire format
//! - `state` - Writer lock and snapshot reads
//! - `state_machine` - validate / apply / commit
//! - `reader` - Read API
//! - `client` - Builds and broadcasts transactions

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod reader;
pub mod state;
pub mod state_machine;
pub mod storage;
pub mod transaction;

pub use error::{ErrorCategory, VaultError, VaultResult};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{LogFormat, DEFAULT_LOG_FILTER};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls the filter; `format` picks JSON or human-readable
/// output. Logs go to stderr so stdout stays free for command output.
pub fn init_logging(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
