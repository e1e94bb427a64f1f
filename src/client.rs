// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client side of the vault: turns plaintext credentials into encrypted
//! transactions and hands them to the replication transport.
//!
//! ## Flow
//!
//! ```text
//! save_item(creds, name, value)
//!   ├─ snapshot read: existing token for `name`?  ──► broadcast deleting
//!   └─ encrypt name + value                       ──► broadcast writing
//! ```
//!
//! The delete and the write are two separate transactions. No lock is held
//! while broadcasting, since the transport calls back into the vault.

use std::sync::Arc;

use crate::crypto::{encrypt_hex, MasterCredentials};
use crate::error::{VaultError, VaultResult};
use crate::reader::VaultReader;
use crate::state_machine::TransactionStateMachine;
use crate::transaction::Transaction;

/// Delivers a transaction to the replicas.
pub trait TxBroadcaster {
    fn broadcast(&self, tx: &Transaction) -> VaultResult<()>;
}

/// Runs validate, apply and commit in-process. Single-replica deployments
/// and tests.
#[derive(Debug, Clone)]
pub struct LocalBroadcaster {
    machine: Arc<TransactionStateMachine>,
}

impl LocalBroadcaster {
    pub fn new(machine: Arc<TransactionStateMachine>) -> Self {
        Self { machine }
    }
}

impl TxBroadcaster for LocalBroadcaster {
    fn broadcast(&self, tx: &Transaction) -> VaultResult<()> {
        let raw = tx.to_bytes();
        self.machine.validate(&raw)?;
        self.machine.apply(&raw)?;
        self.machine.commit()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VaultClient<B> {
    reader: VaultReader,
    broadcaster: B,
}

impl<B: TxBroadcaster> VaultClient<B> {
    pub fn new(reader: VaultReader, broadcaster: B) -> Self {
        Self {
            reader,
            broadcaster,
        }
    }

    pub fn authenticate(&self, creds: &MasterCredentials) -> VaultResult<bool> {
        self.reader.authenticate(&creds.account_key())
    }

    /// Store `value` under `item_name`, replacing any previous value.
    pub fn save_item(
        &self,
        creds: &MasterCredentials,
        item_name: &str,
        value: &str,
    ) -> VaultResult<()> {
        let account = creds.account_key();
        let item_hash = MasterCredentials::item_name_hash(item_name);
        let index_ctx = creds.index_context();

        match self
            .reader
            .find_encrypted_token_for_name(&account, item_name, &index_ctx)
        {
            Ok(token) => {
                self.broadcaster
                    .broadcast(&Transaction::deleting(&account, &item_hash, token))?;
            }
            Err(VaultError::NoSuchAccount | VaultError::NoSuchItem) => {}
            Err(e) => return Err(e),
        }

        let enc_name = encrypt_hex(&index_ctx, item_name)?;
        let enc_value = encrypt_hex(&creds.item_context(item_name), value)?;
        self.broadcaster
            .broadcast(&Transaction::writing(account, item_hash, enc_name, enc_value))
    }

    /// Remove `item_name`. The account must exist.
    pub fn delete_item(&self, creds: &MasterCredentials, item_name: &str) -> VaultResult<()> {
        let account = creds.account_key();
        if !self.reader.authenticate(&account)? {
            return Err(VaultError::NoSuchAccount);
        }

        let token =
            self.reader
                .find_encrypted_token_for_name(&account, item_name, &creds.index_context())?;
        let item_hash = MasterCredentials::item_name_hash(item_name);
        self.broadcaster
            .broadcast(&Transaction::deleting(account, item_hash, token))
    }

    pub fn list_items(&self, creds: &MasterCredentials) -> VaultResult<Vec<String>> {
        self.reader
            .list_item_names(&creds.account_key(), &creds.index_context())
    }

    pub fn get_item(&self, creds: &MasterCredentials, item_name: &str) -> VaultResult<String> {
        self.reader.retrieve_item_value(
            &creds.account_key(),
            &MasterCredentials::item_name_hash(item_name),
            &creds.item_context(item_name),
        )
    }
}
