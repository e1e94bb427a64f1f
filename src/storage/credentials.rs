// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential records: the root tree of accounts and their sub-trees.
//!
//! Every function takes the trees and the byte store it works on explicitly.
//! Nothing here commits; the caller owns the write batch, so a sub-tree
//! mutation and the root tree update that follows it land together or not
//! at all.
//!
//! ## Invariants
//!
//! - `S/{account}` exists in the root tree iff the account's index record
//!   holds at least one token.
//! - Tokens in the index record and item records correspond one-to-one.
//! - After any sub-tree mutation its new hash is written back into the root
//!   tree before the batch is committed.

use crate::crypto::Hash;
use crate::error::{VaultError, VaultResult};
use crate::storage::keys::{account_entry_key, index_key, item_key, DELIMITER, MIN_INDEX_LEN};
use crate::storage::kv::{KvRead, KvWrite, StoreError};
use crate::storage::merkle::{ContentTree, TreeRead, TreeWrite};

/// Result of [`write_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// First item of a new account; the root tree gained an entry.
    AccountOpened,
    /// Item added to an existing account.
    ItemAdded,
}

/// Result of [`delete_item`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Item removed; the account still holds other items.
    Removed,
    /// Last item removed; the sub-tree and its root entry are gone.
    AccountClosed,
}

// =============================================================================
// Sub-Tree Lifecycle
// =============================================================================

/// Load the sub-tree registered for `account` in `root`.
pub fn load_sub_tree<R, S>(root: &R, store: &S, account: &str) -> VaultResult<ContentTree>
where
    R: TreeRead + ?Sized,
    S: KvRead + ?Sized,
{
    let raw = root
        .get(&account_entry_key(account))
        .ok_or(VaultError::NoSuchAccount)?;
    let sub_root: Hash = raw.try_into().map_err(|_| {
        consistency(
            account,
            format!("root entry holds {} bytes, expected a hash", raw.len()),
        )
    })?;

    ContentTree::open(store, &sub_root).map_err(|e| match e {
        StoreError::Missing(_) | StoreError::Corrupt { .. } => consistency(account, e.to_string()),
        other => VaultError::Store(other),
    })
}

/// Create an empty sub-tree and register it in `root` right away.
pub fn new_sub_tree<S>(
    root: &mut ContentTree,
    store: &mut S,
    account: &str,
) -> VaultResult<ContentTree>
where
    S: KvWrite + ?Sized,
{
    let sub = ContentTree::new();
    save_sub_tree(root, store, account, &sub)?;
    Ok(sub)
}

/// Persist `sub` and point the account's root entry at its new hash.
///
/// The root tree itself is not saved; the caller does that once per batch.
pub fn save_sub_tree<S>(
    root: &mut ContentTree,
    store: &mut S,
    account: &str,
    sub: &ContentTree,
) -> VaultResult<Hash>
where
    S: KvWrite + ?Sized,
{
    let sub_root = sub.save(store)?;
    root.set(&account_entry_key(account), &sub_root);
    Ok(sub_root)
}

// =============================================================================
// Item Records
// =============================================================================

/// Append `enc_name` to the index record and store the item payload.
///
/// Returns `true` if an item record already existed under `item_hash` and
/// was overwritten. Callers avoid that by deleting first.
pub fn insert_item(
    sub: &mut ContentTree,
    account: &str,
    item_hash: &str,
    enc_name: &str,
    enc_value: &str,
) -> VaultResult<bool> {
    let mut index = read_index(sub, account)?;
    if index.len() < MIN_INDEX_LEN {
        index = DELIMITER.to_string();
    }
    index.push_str(enc_name);
    index.push(DELIMITER);

    sub.set(&index_key(account), index.as_bytes());
    Ok(sub.set(&item_key(account, item_hash), enc_value.as_bytes()))
}

/// Load or create the account's sub-tree, insert the item and re-link it.
pub fn write_item<S>(
    root: &mut ContentTree,
    store: &mut S,
    account: &str,
    item_hash: &str,
    enc_name: &str,
    enc_value: &str,
) -> VaultResult<WriteOutcome>
where
    S: KvWrite + ?Sized,
{
    let (mut sub, outcome) = if root.has(&account_entry_key(account)) {
        (load_sub_tree(root, store, account)?, WriteOutcome::ItemAdded)
    } else {
        (new_sub_tree(root, store, account)?, WriteOutcome::AccountOpened)
    };

    if insert_item(&mut sub, account, item_hash, enc_name, enc_value)? {
        tracing::warn!(
            account = %account,
            item = %item_hash,
            "Item record overwritten without a prior delete"
        );
    }

    save_sub_tree(root, store, account, &sub)?;
    Ok(outcome)
}

/// Remove an item and its index token.
///
/// Removing the last token also drops the index record and the account's
/// root entry, within the same write batch as the item removal.
pub fn delete_item<S>(
    root: &mut ContentTree,
    store: &mut S,
    account: &str,
    item_hash: &str,
    enc_name: &str,
) -> VaultResult<DeleteOutcome>
where
    S: KvWrite + ?Sized,
{
    let mut sub = load_sub_tree(root, store, account)?;
    let index = read_index(&sub, account)?;
    let token = framed(enc_name);

    let record = item_key(account, item_hash);
    let Some(pos) = index.find(&token) else {
        return Err(VaultError::NoSuchItem);
    };
    if !sub.has(&record) {
        return Err(VaultError::NoSuchItem);
    }

    sub.remove(&record);
    let remaining = format!(
        "{}{DELIMITER}{}",
        &index[..pos],
        &index[pos + token.len()..]
    );

    if remaining.len() >= MIN_INDEX_LEN {
        sub.set(&index_key(account), remaining.as_bytes());
        save_sub_tree(root, store, account, &sub)?;
        return Ok(DeleteOutcome::Removed);
    }

    sub.remove(&index_key(account));
    if !sub.is_empty() {
        return Err(consistency(
            account,
            format!("{} item records left after the last token", sub.len()),
        ));
    }
    root.remove(&account_entry_key(account));
    Ok(DeleteOutcome::AccountClosed)
}

// =============================================================================
// Queries
// =============================================================================

/// Encrypted item-name tokens of the account, in insertion order.
pub fn list_encrypted_item_names<T>(sub: &T, account: &str) -> VaultResult<Vec<String>>
where
    T: TreeRead + ?Sized,
{
    Ok(read_index(sub, account)?
        .split(DELIMITER)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn has_item<T>(sub: &T, account: &str, item_hash: &str) -> bool
where
    T: TreeRead + ?Sized,
{
    sub.has(&item_key(account, item_hash))
}

/// Whether `enc_name` appears as a whole token in the index record.
pub fn index_contains<T>(sub: &T, account: &str, enc_name: &str) -> VaultResult<bool>
where
    T: TreeRead + ?Sized,
{
    Ok(read_index(sub, account)?.contains(&framed(enc_name)))
}

// =============================================================================
// Helpers
// =============================================================================

fn read_index<T>(sub: &T, account: &str) -> VaultResult<String>
where
    T: TreeRead + ?Sized,
{
    match sub.get(&index_key(account)) {
        None => Ok(String::new()),
        Some(raw) => String::from_utf8(raw.to_vec())
            .map_err(|_| consistency(account, "index record is not UTF-8".to_string())),
    }
}

fn framed(token: &str) -> String {
    format!("{DELIMITER}{token}{DELIMITER}")
}

fn consistency(account: &str, detail: String) -> VaultError {
    tracing::error!(account = %account, detail = %detail, "Credential store consistency violation");
    VaultError::ConsistencyViolation(detail)
}

// =============================================================================
// Tests
// =============================================================================
