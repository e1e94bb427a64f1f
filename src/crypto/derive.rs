// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Derivation of lookup keys and key material from master credentials.
//!
//! | Derived value | Composite input |
//! |---------------|-----------------|
//! | Account key | `hash_hex(username) / hash_hex(password)` (hashed again) |
//! | Index key material | `username/password` |
//! | Item key material | `item_name/password/username` |
//! | Item name hash | `item_name` |
//!
//! The account key is public (it appears in transactions and tree keys); the
//! key material composites differ from it, so knowing an account key gives no
//! way to decrypt the account's records.

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{hash, hash_hex, HASH_LEN};

/// Symmetric key for one class of stored value. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; HASH_LEN]);

impl KeyMaterial {
    /// `hash(composite)`.
    pub fn derive(composite: &str) -> Self {
        Self(hash(composite.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyMaterial").field(&"[REDACTED]").finish()
    }
}

/// The secrets a user presents to reach their account.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterCredentials {
    username: String,
    password: String,
}

impl MasterCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Lookup key for the account's root tree entry.
    pub fn account_key(&self) -> String {
        let composite = format!(
            "{}/{}",
            hash_hex(self.username.as_bytes()),
            hash_hex(self.password.as_bytes())
        );
        hash_hex(composite.as_bytes())
    }

    /// Key material for the encrypted item-name tokens in the index record.
    pub fn index_context(&self) -> KeyMaterial {
        KeyMaterial::derive(&format!("{}/{}", self.username, self.password))
    }

    /// Key material for one item's encrypted payload.
    pub fn item_context(&self, item_name: &str) -> KeyMaterial {
        KeyMaterial::derive(&format!(
            "{item_name}/{}/{}",
            self.password, self.username
        ))
    }

    /// Lookup key for an item record, scoped under the account in the tree.
    pub fn item_name_hash(item_name: &str) -> String {
        hash_hex(item_name.as_bytes())
    }
}

impl std::fmt::Debug for MasterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterCredentials")
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .finish()
    }
}
