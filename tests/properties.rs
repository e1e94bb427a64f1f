// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Generated-input properties of the vault: round-trips, key isolation and
//! replica determinism.

use std::collections::HashMap;
use std::sync::Arc;

use passwerk::client::{LocalBroadcaster, VaultClient};
use passwerk::crypto::{decrypt_hex, encrypt_hex, MasterCredentials};
use passwerk::reader::VaultReader;
use passwerk::state::VaultState;
use passwerk::state_machine::{ResultCode, TransactionStateMachine};
use passwerk::storage::StoragePaths;
use passwerk::transaction::Transaction;
use passwerk::VaultError;
use proptest::prelude::*;

struct Vault {
    machine: Arc<TransactionStateMachine>,
    client: VaultClient<LocalBroadcaster>,
    reader: VaultReader,
    _dir: tempfile::TempDir,
}

fn open_vault() -> Vault {
    let dir = tempfile::tempdir().unwrap();
    let state = VaultState::open(&StoragePaths::new(dir.path())).unwrap();
    let machine = Arc::new(TransactionStateMachine::new(state.clone()));
    let reader = VaultReader::new(state);
    let client = VaultClient::new(reader.clone(), LocalBroadcaster::new(machine.clone()));
    Vault {
        machine,
        client,
        reader,
        _dir: dir,
    }
}

/// Item names: empty, slash-laden and non-ASCII strings included.
fn item_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z/]{1,6}",
        "(/|\\PC){0,12}",
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Write { user: usize, item: usize, value: String },
    Delete { user: usize, item: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..3usize, 0..4usize, "\\PC{0,8}")
            .prop_map(|(user, item, value)| Op::Write { user, item, value }),
        2 => (0..3usize, 0..4usize).prop_map(|(user, item)| Op::Delete { user, item }),
    ]
}

/// Encode `ops` once, so every replica receives identical bytes. Deletes
/// reuse the token of the latest write of the same item; deletes of items
/// never written carry a token no index holds.
fn encode(ops: &[Op]) -> Vec<Vec<u8>> {
    let users: Vec<_> = (0..3)
        .map(|i| MasterCredentials::new(format!("user{i}"), format!("pass{i}")))
        .collect();
    let mut tokens: HashMap<(usize, usize), String> = HashMap::new();

    ops.iter()
        .map(|op| match op {
            Op::Write { user, item, value } => {
                let creds = &users[*user];
                let name = format!("item{item}");
                let enc_name = encrypt_hex(&creds.index_context(), &name).unwrap();
                let enc_value = encrypt_hex(&creds.item_context(&name), value).unwrap();
                tokens.insert((*user, *item), enc_name.clone());
                Transaction::writing(
                    creds.account_key(),
                    MasterCredentials::item_name_hash(&name),
                    enc_name,
                    enc_value,
                )
                .to_bytes()
            }
            Op::Delete { user, item } => {
                let creds = &users[*user];
                let name = format!("item{item}");
                let token = tokens
                    .get(&(*user, *item))
                    .cloned()
                    .unwrap_or_else(|| "00".to_string());
                Transaction::deleting(
                    creds.account_key(),
                    MasterCredentials::item_name_hash(&name),
                    token,
                )
                .to_bytes()
            }
        })
        .collect()
}

/// Feed `txs` through check, deliver and commit, recording every outcome.
fn replay(vault: &Vault, txs: &[Vec<u8>]) -> Vec<(ResultCode, [u8; 32])> {
    txs.iter()
        .map(|raw| {
            let mut result = vault.machine.check_tx(raw);
            if result.is_ok() {
                result = vault.machine.deliver_tx(raw);
            }
            (result.code, vault.machine.commit().unwrap())
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn saved_items_round_trip(
        items in prop::collection::btree_map(item_name(), any::<String>(), 1..4),
    ) {
        let vault = open_vault();
        let creds = MasterCredentials::new("masterUsr", "masterPwd");
        for (name, value) in &items {
            vault.client.save_item(&creds, name, value).unwrap();
        }

        for (name, value) in &items {
            prop_assert_eq!(&vault.client.get_item(&creds, name).unwrap(), value);
        }
        let mut names = vault.client.list_items(&creds).unwrap();
        names.sort();
        let expected: Vec<String> = items.keys().cloned().collect();
        prop_assert_eq!(names, expected);
    }

    #[test]
    fn wrong_context_never_decrypts(
        name in item_name(),
        value in any::<String>(),
        password in "\\PC{0,8}",
        other in "\\PC{0,8}",
    ) {
        prop_assume!(password != other);
        let vault = open_vault();
        let creds = MasterCredentials::new("masterUsr", password);
        let wrong = MasterCredentials::new("masterUsr", other);
        vault.client.save_item(&creds, &name, &value).unwrap();

        let sealed = encrypt_hex(&creds.item_context(&name), &value).unwrap();
        prop_assert!(decrypt_hex(&wrong.item_context(&name), &sealed).is_err());

        let account = creds.account_key();
        let item_hash = MasterCredentials::item_name_hash(&name);
        let retrieved =
            vault.reader.retrieve_item_value(&account, &item_hash, &wrong.item_context(&name));
        prop_assert!(matches!(retrieved, Err(VaultError::NoSuchItem)));
        let listed = vault.reader.list_item_names(&account, &wrong.index_context());
        prop_assert!(matches!(listed, Err(VaultError::Decryption)));
    }

    #[test]
    fn replicas_agree_on_every_commit(ops in prop::collection::vec(op(), 1..24)) {
        let txs = encode(&ops);
        let first = replay(&open_vault(), &txs);
        let second = replay(&open_vault(), &txs);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn item_names_cover_the_awkward_cases() {
    let names = [("", "empty"), ("a/b/", "slashes"), ("pässwört", "umlauts")];
    let vault = open_vault();
    let creds = MasterCredentials::new("masterUsr", "masterPwd");
    for (name, value) in names {
        vault.client.save_item(&creds, name, value).unwrap();
    }
    for (name, value) in names {
        assert_eq!(vault.client.get_item(&creds, name).unwrap(), value);
    }
}
