// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read API for the presentation layer.
//!
//! Each call opens its own [`Snapshot`](crate::state::Snapshot), so it sees
//! one committed state and never waits on the writer lock. Callers bring the
//! key material; the vault only stores ciphertext.

use crate::crypto::{decrypt_hex, KeyMaterial};
use crate::error::{VaultError, VaultResult};
use crate::state::VaultState;
use crate::storage::credentials;
use crate::storage::keys::item_key;
use crate::storage::TreeRead;

#[derive(Debug, Clone)]
pub struct VaultReader {
    state: VaultState,
}

impl VaultReader {
    pub fn new(state: VaultState) -> Self {
        Self { state }
    }

    /// Whether the account currently holds any items.
    pub fn authenticate(&self, account: &str) -> VaultResult<bool> {
        Ok(self.state.snapshot()?.authenticate(account))
    }

    /// Plaintext names of every item in the account.
    ///
    /// Fails with [`VaultError::Decryption`] if any token does not open
    /// under `index_ctx`.
    pub fn list_item_names(
        &self,
        account: &str,
        index_ctx: &KeyMaterial,
    ) -> VaultResult<Vec<String>> {
        let snapshot = self.state.snapshot()?;
        let sub = snapshot.load_sub_tree(account)?;

        credentials::list_encrypted_item_names(&sub, account)?
            .iter()
            .map(|token| decrypt_hex(index_ctx, token).map_err(VaultError::from))
            .collect()
    }

    /// Decrypted payload of one item.
    ///
    /// A payload that does not open under `item_ctx` is reported as
    /// [`VaultError::NoSuchItem`], same as a missing one.
    pub fn retrieve_item_value(
        &self,
        account: &str,
        item_hash: &str,
        item_ctx: &KeyMaterial,
    ) -> VaultResult<String> {
        let snapshot = self.state.snapshot()?;
        let sub = snapshot.load_sub_tree(account)?;

        let raw = sub
            .get(&item_key(account, item_hash))
            .ok_or(VaultError::NoSuchItem)?;
        let ciphertext = std::str::from_utf8(raw).map_err(|_| VaultError::NoSuchItem)?;
        decrypt_hex(item_ctx, ciphertext).map_err(|e| {
            tracing::debug!(account = %account, error = %e, "Item payload did not decrypt");
            VaultError::NoSuchItem
        })
    }

    /// Encrypted index token whose plaintext is `item_name`.
    ///
    /// Needed to build a delete transaction. Tokens that do not open under
    /// `index_ctx` are skipped.
    pub fn find_encrypted_token_for_name(
        &self,
        account: &str,
        item_name: &str,
        index_ctx: &KeyMaterial,
    ) -> VaultResult<String> {
        let snapshot = self.state.snapshot()?;
        let sub = snapshot.load_sub_tree(account)?;

        credentials::list_encrypted_item_names(&sub, account)?
            .into_iter()
            .find(|token| {
                decrypt_hex(index_ctx, token).is_ok_and(|name| name == item_name)
            })
            .ok_or(VaultError::NoSuchItem)
    }
}
