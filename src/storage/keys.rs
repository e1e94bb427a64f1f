// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key layout for the root tree, the per-account sub-trees and the byte store.
//!
//! Root and sub-tree nodes share one byte store, so tree keys carry a prefix:
//!
//! ```text
//! root tree   S/{account}                  -> sub-tree root hash (32 bytes)
//! sub-tree    V/{account}                  -> index record "/tok1/tok2/"
//!             V/{account}/{item_name_hash} -> encrypted item payload
//! byte store  commitment/root              -> root tree hash (32 bytes)
//! ```

/// Byte-store key holding the current root tree hash.
pub const COMMITMENT_KEY: &[u8] = b"commitment/root";

/// Separates tokens in the index record and fields in a transaction.
pub const DELIMITER: char = '/';

/// An index record shorter than this holds no tokens (`"/"` or nothing).
pub const MIN_INDEX_LEN: usize = 2;

const SUB_TREE_PREFIX: &str = "S";
const SUB_TREE_VALUE_PREFIX: &str = "V";

/// Root tree key whose value is the account's sub-tree hash.
pub fn account_entry_key(account: &str) -> Vec<u8> {
    format!("{SUB_TREE_PREFIX}/{account}").into_bytes()
}

/// Sub-tree key of the account's index record.
pub fn index_key(account: &str) -> Vec<u8> {
    format!("{SUB_TREE_VALUE_PREFIX}/{account}").into_bytes()
}

/// Sub-tree key of one item record.
pub fn item_key(account: &str, item_name_hash: &str) -> Vec<u8> {
    format!("{SUB_TREE_VALUE_PREFIX}/{account}/{item_name_hash}").into_bytes()
}
