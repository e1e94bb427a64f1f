// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared vault handle: one writer at a time, snapshot reads for everyone.
//!
//! ## Writers
//!
//! [`VaultState::lock_writer`] hands out the only path to the canonical root
//! tree. [`WriterGuard::transact`] mutates a clone of the root inside one
//! redb write transaction, stores the new commitment in the same
//! transaction, and publishes the clone only after the commit succeeded. A
//! failed session leaves both the byte store and the in-memory root as they
//! were.
//!
//! ## Readers
//!
//! [`VaultState::snapshot`] opens a redb read transaction and reads the
//! commitment recorded in it. If the last published root has that hash the
//! snapshot shares it; otherwise the root is loaded from the read
//! transaction. It never touches the writer mutex, so reads neither wait for
//! nor delay an in-flight apply, and they only ever see fully committed
//! states.
//!
//! Never hold a [`WriterGuard`] across a call that can re-enter the vault
//! (such as broadcasting a transaction).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::crypto::Hash;
use crate::error::{VaultError, VaultResult};
use crate::storage::credentials;
use crate::storage::keys::{account_entry_key, COMMITMENT_KEY};
use crate::storage::{
    ContentTree, KvRead, KvStore, KvWrite, ReadOnlyTree, ReadView, StoragePaths, StoreError,
    TreeRead, TreeWrite, WriteBatch,
};

/// Canonical state owned by the writer lock.
#[derive(Debug, Default)]
struct WriterState {
    root: Arc<ContentTree>,
}

#[derive(Clone)]
pub struct VaultState {
    store: Arc<KvStore>,
    writer: Arc<Mutex<WriterState>>,
    /// Last committed root, shared with snapshots. Only swapped, never
    /// held across store I/O.
    published: Arc<RwLock<Arc<ContentTree>>>,
}

impl VaultState {
    /// Open (or create) the vault under `paths` and load the committed root.
    pub fn open(paths: &StoragePaths) -> VaultResult<Self> {
        let store = KvStore::open(&paths.db_file())?;

        let root = {
            let view = store.begin_read()?;
            match read_commitment(&view)? {
                Some(hash) => ContentTree::open(&view, &hash).map_err(commitment_error)?,
                None => ContentTree::new(),
            }
        };

        tracing::info!(
            path = %paths.db_file().display(),
            accounts = root.len(),
            root = %hex::encode(root.hash()),
            "Vault opened"
        );

        let root = Arc::new(root);
        Ok(Self {
            store: Arc::new(store),
            published: Arc::new(RwLock::new(Arc::clone(&root))),
            writer: Arc::new(Mutex::new(WriterState { root })),
        })
    }

    /// Acquire exclusive write access to the canonical trees.
    pub fn lock_writer(&self) -> VaultResult<WriterGuard<'_>> {
        let state = self.writer.lock().map_err(|_| VaultError::LockPoisoned)?;
        Ok(WriterGuard {
            store: &self.store,
            published: &self.published,
            state,
        })
    }

    /// Point-in-time read session over the last committed state.
    pub fn snapshot(&self) -> VaultResult<Snapshot> {
        let view = self.store.begin_read()?;
        let root = match read_commitment(&view)? {
            Some(hash) => match self.published_root().filter(|root| root.hash() == hash) {
                Some(root) => ReadOnlyTree::from(root),
                None => ReadOnlyTree::open(&view, &hash).map_err(commitment_error)?,
            },
            None => ReadOnlyTree::default(),
        };
        Ok(Snapshot { view, root })
    }

    fn published_root(&self) -> Option<Arc<ContentTree>> {
        self.published
            .read()
            .ok()
            .map(|published| Arc::clone(&*published))
    }

    /// Number of registered accounts. Diagnostic only.
    pub fn account_count(&self) -> usize {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .root
            .len()
    }
}

impl std::fmt::Debug for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultState")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Write Sessions
// =============================================================================

/// Exclusive access to the canonical root tree. Released on drop.
pub struct WriterGuard<'a> {
    store: &'a KvStore,
    published: &'a RwLock<Arc<ContentTree>>,
    state: MutexGuard<'a, WriterState>,
}

impl WriterGuard<'_> {
    pub fn root(&self) -> &ContentTree {
        self.state.root.as_ref()
    }

    pub fn root_hash(&self) -> Hash {
        self.state.root.hash()
    }

    /// Run `f` against a working copy of the root tree and a fresh write
    /// batch, then persist the root and its commitment and commit.
    ///
    /// Nothing is published if `f` or any persistence step fails.
    pub fn transact<T, F>(&mut self, f: F) -> VaultResult<T>
    where
        F: FnOnce(&mut ContentTree, &mut WriteBatch) -> VaultResult<T>,
    {
        let mut root = ContentTree::clone(&self.state.root);
        let mut batch = self.store.begin_write()?;

        let out = match f(&mut root, &mut batch) {
            Ok(out) => out,
            Err(e) => {
                if let Err(abort) = batch.abort() {
                    tracing::warn!(error = %abort, "Failed to abort write batch");
                }
                return Err(e);
            }
        };

        let hash = root.save(&mut batch)?;
        batch.set(COMMITMENT_KEY, &hash)?;
        batch.commit()?;

        let root = Arc::new(root);
        self.state.root = Arc::clone(&root);
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = root;
        Ok(out)
    }

    /// Make sure the stored commitment matches the in-memory root.
    ///
    /// Returns the root hash and whether the pointer had to be rewritten.
    pub fn persist_commitment(&mut self) -> VaultResult<(Hash, bool)> {
        let hash = self.root_hash();
        let stored = {
            let view = self.store.begin_read()?;
            read_commitment(&view)?
        };
        if stored == Some(hash) {
            return Ok((hash, false));
        }

        let mut batch = self.store.begin_write()?;
        self.state.root.save(&mut batch)?;
        batch.set(COMMITMENT_KEY, &hash)?;
        batch.commit()?;
        Ok((hash, true))
    }
}

// =============================================================================
// Read Sessions
// =============================================================================

/// Read-only view of one committed vault state. Dropping it ends the
/// session and releases the underlying read transaction.
pub struct Snapshot {
    view: ReadView,
    root: ReadOnlyTree,
}

impl Snapshot {
    pub fn root(&self) -> &ReadOnlyTree {
        &self.root
    }

    pub fn root_hash(&self) -> Hash {
        self.root.hash()
    }

    pub fn view(&self) -> &ReadView {
        &self.view
    }

    /// Whether `account` has a registered sub-tree.
    pub fn authenticate(&self, account: &str) -> bool {
        self.root.has(&account_entry_key(account))
    }

    pub fn load_sub_tree(&self, account: &str) -> VaultResult<ReadOnlyTree> {
        credentials::load_sub_tree(&self.root, &self.view, account).map(ReadOnlyTree::from)
    }
}

// =============================================================================
// Commitment Pointer
// =============================================================================

fn read_commitment<S: KvRead + ?Sized>(store: &S) -> VaultResult<Option<Hash>> {
    let Some(raw) = store.get(COMMITMENT_KEY)? else {
        return Ok(None);
    };
    let hash: Hash = raw.as_slice().try_into().map_err(|_| {
        tracing::error!(len = raw.len(), "Commitment pointer has the wrong length");
        VaultError::ConsistencyViolation("commitment pointer is not a hash".to_string())
    })?;
    Ok(Some(hash))
}

fn commitment_error(e: StoreError) -> VaultError {
    match e {
        StoreError::Missing(_) | StoreError::Corrupt { .. } => {
            tracing::error!(error = %e, "Committed root tree cannot be loaded");
            VaultError::ConsistencyViolation(e.to_string())
        }
        other => VaultError::Store(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EMPTY_ROOT, NODE_KEY_PREFIX};

    fn temp_vault() -> (VaultState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = VaultState::open(&StoragePaths::new(dir.path())).unwrap();
        (state, dir)
    }

    fn write(state: &VaultState, account: &str, item: &str) -> VaultResult<()> {
        let mut writer = state.lock_writer()?;
        writer.transact(|root, batch| {
            credentials::write_item(root, batch, account, item, "tok", "val").map(|_| ())
        })
    }

    #[test]
    fn fresh_vault_is_empty() {
        let (state, _dir) = temp_vault();
        assert_eq!(state.account_count(), 0);
        assert_eq!(state.snapshot().unwrap().root_hash(), EMPTY_ROOT);
        assert_eq!(state.lock_writer().unwrap().root_hash(), EMPTY_ROOT);
    }

    #[test]
    fn transact_publishes_and_persists() {
        let (state, _dir) = temp_vault();
        write(&state, "acct", "h1").unwrap();

        let hash = state.lock_writer().unwrap().root_hash();
        assert_ne!(hash, EMPTY_ROOT);

        let snap = state.snapshot().unwrap();
        assert_eq!(snap.root_hash(), hash);
        assert!(snap.authenticate("acct"));
        assert!(!snap.authenticate("other"));
        assert_eq!(snap.load_sub_tree("acct").unwrap().len(), 2);
    }

    #[test]
    fn failed_session_changes_nothing() {
        let (state, _dir) = temp_vault();
        write(&state, "acct", "h1").unwrap();
        let before = state.snapshot().unwrap().root_hash();

        let mut writer = state.lock_writer().unwrap();
        let result: VaultResult<()> = writer.transact(|root, batch| {
            credentials::write_item(root, batch, "acct", "h2", "tok2", "val2")?;
            Err(VaultError::NoSuchItem)
        });
        assert!(matches!(result, Err(VaultError::NoSuchItem)));
        assert_eq!(writer.root_hash(), before);
        drop(writer);

        assert_eq!(state.snapshot().unwrap().root_hash(), before);
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let (state, _dir) = temp_vault();
        let before = state.snapshot().unwrap();
        write(&state, "acct", "h1").unwrap();

        assert!(!before.authenticate("acct"));
        assert!(state.snapshot().unwrap().authenticate("acct"));
    }

    #[test]
    fn snapshot_does_not_wait_for_the_writer() {
        let (state, _dir) = temp_vault();
        write(&state, "acct", "h1").unwrap();

        let _writer = state.lock_writer().unwrap();
        let snap = state.snapshot().unwrap();
        assert!(snap.authenticate("acct"));
    }

    #[test]
    fn reopen_restores_committed_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StoragePaths::new(dir.path());
        let hash = {
            let state = VaultState::open(&paths).unwrap();
            write(&state, "acct", "h1").unwrap();
            let hash = state.lock_writer().unwrap().root_hash();
            hash
        };

        let reopened = VaultState::open(&paths).unwrap();
        assert_eq!(reopened.lock_writer().unwrap().root_hash(), hash);
        assert_eq!(reopened.account_count(), 1);
    }

    #[test]
    fn persist_commitment_only_writes_when_stale() {
        let (state, _dir) = temp_vault();
        let mut writer = state.lock_writer().unwrap();
        let (hash, rewritten) = writer.persist_commitment().unwrap();
        assert_eq!(hash, EMPTY_ROOT);
        assert!(rewritten);

        let (_, rewritten) = writer.persist_commitment().unwrap();
        assert!(!rewritten);
    }

    #[test]
    fn writes_to_one_account_do_not_copy_the_root_tree() {
        let (state, _dir) = temp_vault();
        state
            .lock_writer()
            .unwrap()
            .transact(|root, batch| {
                for i in 0..200 {
                    let account = format!("acct-{i}");
                    credentials::write_item(root, batch, &account, "h0", "tok0", "val")?;
                }
                Ok(())
            })
            .unwrap();

        let node_bytes = |state: &VaultState| {
            let snapshot = state.snapshot().unwrap();
            snapshot.view().prefix_usage(NODE_KEY_PREFIX).unwrap().bytes
        };
        let full_root_copy: usize = state
            .lock_writer()
            .unwrap()
            .root()
            .iter()
            .map(|(k, v)| 2 * (k.len() + v.len()))
            .sum();

        let before = node_bytes(&state);
        for n in 1..=10 {
            let (item, token) = (format!("h{n}"), format!("tok{n}"));
            let mut writer = state.lock_writer().unwrap();
            writer
                .transact(|root, batch| {
                    credentials::write_item(root, batch, "acct-7", &item, &token, "val")
                        .map(|_| ())
                })
                .unwrap();
        }
        let per_write = (node_bytes(&state) - before) / 10;

        assert!(
            per_write < full_root_copy / 2,
            "{per_write} bytes per write, full root is {full_root_copy}"
        );
        assert_eq!(state.account_count(), 200);
        let sub = state.snapshot().unwrap().load_sub_tree("acct-7").unwrap();
        assert_eq!(sub.len(), 1 + 11);
    }
}
