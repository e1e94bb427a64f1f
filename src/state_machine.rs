// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transaction State Machine
//!
//! The contract the replication transport drives, once per transaction:
//!
//! ```text
//! validate(tx) ──► apply(tx) ──► commit() -> root hash
//! ```
//!
//! - `validate` decodes the transaction and checks its preconditions
//!   against the last committed state. It never mutates.
//! - `apply` re-validates under the writer lock, mutates the credential
//!   store and persists the new commitment in the same write batch.
//! - `commit` returns the root hash, the fingerprint every replica must
//!   agree on. It is idempotent.
//!
//! ## Result Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | OK |
//! | 1 | Invalid transaction format |
//! | 2 | Precondition failed / unknown record |
//! | 3 | Internal error |
//! | 4 | Unsupported request |

use crate::crypto::Hash;
use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;
use crate::storage::credentials::{self, DeleteOutcome, WriteOutcome};
use crate::storage::keys::account_entry_key;
use crate::storage::{KvRead, TreeRead};
use crate::transaction::Transaction;

/// Fixed reply to every query.
pub const QUERY_UNSUPPORTED: &str = "Query is not supported";

/// Stable numeric result codes reported to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    Ok = 0,
    InvalidFormat = 1,
    PreconditionFailed = 2,
    Internal = 3,
    Unsupported = 4,
}

impl ResultCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl From<&VaultError> for ResultCode {
    fn from(e: &VaultError) -> Self {
        match e {
            VaultError::InvalidFormat(_) => ResultCode::InvalidFormat,
            VaultError::PreconditionFailed(_)
            | VaultError::NoSuchAccount
            | VaultError::NoSuchItem => ResultCode::PreconditionFailed,
            _ => ResultCode::Internal,
        }
    }
}

/// Transport-facing outcome of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    pub code: ResultCode,
    pub log: String,
}

impl TxResult {
    pub fn ok() -> Self {
        Self {
            code: ResultCode::Ok,
            log: String::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResultCode::Ok
    }
}

impl From<&VaultError> for TxResult {
    fn from(e: &VaultError) -> Self {
        Self {
            code: e.into(),
            log: e.to_string(),
        }
    }
}

/// What a successful `apply` did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Written(WriteOutcome),
    Deleted(DeleteOutcome),
}

pub struct TransactionStateMachine {
    state: VaultState,
}

impl TransactionStateMachine {
    pub fn new(state: VaultState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    /// Decode `raw` and check it against the last committed state.
    pub fn validate(&self, raw: &[u8]) -> VaultResult<Transaction> {
        let tx = Transaction::parse(raw)?;
        let snapshot = self.state.snapshot()?;
        check_preconditions(&tx, snapshot.root(), snapshot.view())?;
        Ok(tx)
    }

    /// Re-validate and apply `raw` under the writer lock.
    pub fn apply(&self, raw: &[u8]) -> VaultResult<Applied> {
        let tx = Transaction::parse(raw)?;
        let mut writer = self.state.lock_writer()?;

        let applied = writer.transact(|root, batch| {
            check_preconditions(&tx, &*root, &*batch)?;

            match &tx {
                Transaction::Writing {
                    account,
                    item_hash,
                    enc_name,
                    enc_value,
                    ..
                } => credentials::write_item(root, batch, account, item_hash, enc_name, enc_value)
                    .map(Applied::Written),
                Transaction::Deleting {
                    account,
                    item_hash,
                    enc_name,
                    ..
                } => credentials::delete_item(root, batch, account, item_hash, enc_name)
                    .map(Applied::Deleted),
            }
        })?;

        match applied {
            Applied::Written(WriteOutcome::AccountOpened) => {
                tracing::info!(account = %tx.account(), "Account opened");
            }
            Applied::Deleted(DeleteOutcome::AccountClosed) => {
                tracing::info!(account = %tx.account(), "Account closed");
            }
            _ => {}
        }
        tracing::info!(
            op = tx.tag(),
            account = %tx.account(),
            item = %tx.item_hash(),
            root = %hex::encode(writer.root_hash()),
            "Transaction applied"
        );
        Ok(applied)
    }

    /// Current root hash. Rewrites the commitment pointer if it is stale.
    pub fn commit(&self) -> VaultResult<Hash> {
        let mut writer = self.state.lock_writer()?;
        let (hash, rewritten) = writer.persist_commitment()?;
        if rewritten {
            tracing::warn!(root = %hex::encode(hash), "Stale commitment pointer rewritten");
        }
        tracing::debug!(root = %hex::encode(hash), "Commit");
        Ok(hash)
    }

    /// Diagnostic summary.
    pub fn info(&self) -> String {
        format!("size:{}", self.state.account_count())
    }

    /// Accepted and ignored.
    pub fn set_option(&self, key: &str, value: &str) -> String {
        tracing::debug!(key = %key, value = %value, "set_option ignored");
        String::new()
    }

    pub fn query(&self, _query: &[u8]) -> TxResult {
        TxResult {
            code: ResultCode::Unsupported,
            log: QUERY_UNSUPPORTED.to_string(),
        }
    }

    /// [`validate`](Self::validate) reported in transport form.
    pub fn check_tx(&self, raw: &[u8]) -> TxResult {
        match self.validate(raw) {
            Ok(_) => TxResult::ok(),
            Err(e) => reject("check_tx", &e),
        }
    }

    /// [`apply`](Self::apply) reported in transport form.
    pub fn deliver_tx(&self, raw: &[u8]) -> TxResult {
        match self.apply(raw) {
            Ok(_) => TxResult::ok(),
            Err(e) => reject("deliver_tx", &e),
        }
    }
}

impl std::fmt::Debug for TransactionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStateMachine")
            .field("state", &self.state)
            .finish()
    }
}

/// A write must not land on an existing item record, since that would
/// leave two index tokens for one record. A delete needs the item record
/// and its index token to both exist.
fn check_preconditions<R, S>(tx: &Transaction, root: &R, store: &S) -> VaultResult<()>
where
    R: TreeRead + ?Sized,
    S: KvRead + ?Sized,
{
    let (account, item_hash, enc_name) = match tx {
        Transaction::Writing {
            account, item_hash, ..
        } => return check_write(root, store, account, item_hash),
        Transaction::Deleting {
            account,
            item_hash,
            enc_name,
            ..
        } => (account, item_hash, enc_name),
    };

    let sub = credentials::load_sub_tree(root, store, account).map_err(|e| match e {
        VaultError::NoSuchAccount => {
            VaultError::PreconditionFailed("account does not exist".to_string())
        }
        other => other,
    })?;
    if !credentials::has_item(&sub, account, item_hash) {
        return Err(VaultError::PreconditionFailed(
            "record to delete does not exist".to_string(),
        ));
    }
    if !credentials::index_contains(&sub, account, enc_name)? {
        return Err(VaultError::PreconditionFailed(
            "index does not contain the item name".to_string(),
        ));
    }
    Ok(())
}

fn check_write<R, S>(root: &R, store: &S, account: &str, item_hash: &str) -> VaultResult<()>
where
    R: TreeRead + ?Sized,
    S: KvRead + ?Sized,
{
    if !root.has(&account_entry_key(account)) {
        return Ok(());
    }
    let sub = credentials::load_sub_tree(root, store, account)?;
    if credentials::has_item(&sub, account, item_hash) {
        return Err(VaultError::PreconditionFailed(
            "item record already exists".to_string(),
        ));
    }
    Ok(())
}

fn reject(phase: &'static str, e: &VaultError) -> TxResult {
    match e {
        VaultError::InvalidFormat(_) | VaultError::PreconditionFailed(_) => {
            tracing::debug!(phase, code = e.error_code(), error = %e, "Transaction rejected");
        }
        _ => {
            tracing::error!(phase, code = e.error_code(), error = %e, "Transaction failed");
        }
    }
    e.into()
}
