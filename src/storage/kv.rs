// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded byte store backed by redb (pure Rust, ACID).
//!
//! The vault only needs get/set/delete over opaque byte keys, so everything
//! lives in a single table. Two capability traits sit on top:
//!
//! - [`KvRead`] - implemented by [`ReadView`] (a point-in-time MVCC read
//!   transaction) and by [`WriteBatch`].
//! - [`KvWrite`] - implemented only by [`WriteBatch`]; nothing becomes visible
//!   to readers until [`WriteBatch::commit`].

use std::path::{Path, PathBuf};

use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition,
    WriteTransaction,
};

// =============================================================================
// Table Definitions
// =============================================================================

/// Single keyspace: opaque key bytes → opaque value bytes.
const KV: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A record exists but does not decode to what its key promises.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// A record the caller addressed by hash is absent.
    #[error("missing record: {0}")]
    Missing(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Capabilities
// =============================================================================

/// Read access to the byte store.
pub trait KvRead {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Write access to the byte store.
pub trait KvWrite: KvRead {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Returns whether a value was present.
    fn delete(&mut self, key: &[u8]) -> StoreResult<bool>;
}

// =============================================================================
// KvStore
// =============================================================================

/// Handle to the embedded database file.
pub struct KvStore {
    db: Database,
    path: PathBuf,
}

impl KvStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so read transactions on a fresh file don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KV)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "Byte store opened");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start an atomic batch of writes.
    pub fn begin_write(&self) -> StoreResult<WriteBatch> {
        Ok(WriteBatch {
            txn: self.db.begin_write()?,
        })
    }

    /// Open a point-in-time view. Never blocks and is never blocked by writers.
    pub fn begin_read(&self) -> StoreResult<ReadView> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(KV)?;
        Ok(ReadView { _txn: txn, table })
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").field("path", &self.path).finish()
    }
}

// =============================================================================
// WriteBatch
// =============================================================================

/// Pending writes. Dropping a batch without committing discards it.
pub struct WriteBatch {
    txn: WriteTransaction,
}

impl WriteBatch {
    pub fn commit(self) -> StoreResult<()> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn abort(self) -> StoreResult<()> {
        self.txn.abort()?;
        Ok(())
    }
}

impl KvRead for WriteBatch {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let table = self.txn.open_table(KV)?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }
}

impl KvWrite for WriteBatch {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut table = self.txn.open_table(KV)?;
        table.insert(key, value)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<bool> {
        let mut table = self.txn.open_table(KV)?;
        let removed = table.remove(key)?.is_some();
        Ok(removed)
    }
}

// =============================================================================
// ReadView
// =============================================================================

/// Read-only MVCC snapshot of the store.
pub struct ReadView {
    _txn: ReadTransaction,
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
}

impl ReadView {
    /// Number of records and total value bytes stored under `prefix`.
    pub fn prefix_usage(&self, prefix: &[u8]) -> StoreResult<PrefixUsage> {
        let mut usage = PrefixUsage::default();
        for entry in self.table.range(prefix..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(prefix) {
                break;
            }
            usage.records += 1;
            usage.bytes += value.value().len();
        }
        Ok(usage)
    }
}

impl KvRead for ReadView {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let value = self.table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefixUsage {
    pub records: usize,
    pub bytes: usize,
}

// =============================================================================
// Tests
// =============================================================================
