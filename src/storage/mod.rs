// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent vault state: a content-addressed root tree of accounts whose
//! entries point at per-account sub-trees, all stored in one embedded redb
//! database.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   vault.redb              # single byte store
//!     commitment/root       # current root tree hash
//!     node/{hex hash}       # tree nodes (leaf or inner), shared across versions
//! ```
//!
//! ## Layers
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `kv` | Byte store: write batches and point-in-time read views |
//! | `merkle` | Versioned content tree, read and write capabilities |
//! | `keys` | Tree and byte-store key layout |
//! | `credentials` | Account sub-trees, index records, item records |
//! | `paths` | On-disk locations |
//!
//! ## Important Notes
//!
//! - Values reach this module already encrypted; it never sees key material.
//! - Nothing here takes a lock. Serialization of writers is done by
//!   [`crate::state::VaultState`].

pub mod credentials;
pub mod keys;
pub mod kv;
pub mod merkle;
pub mod paths;

pub use credentials::{DeleteOutcome, WriteOutcome};
pub use kv::{
    KvRead, KvStore, KvWrite, PrefixUsage, ReadView, StoreError, StoreResult, WriteBatch,
};
pub use merkle::{ContentTree, ReadOnlyTree, TreeRead, TreeWrite, EMPTY_ROOT, NODE_KEY_PREFIX};
pub use paths::StoragePaths;
