// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction wire format.
//!
//! ```text
//! <timestamp>/writing/<account>/<item hash>/<encrypted name>/<encrypted value>
//! <timestamp>/deleting/<account>/<item hash>/<encrypted name>
//! ```
//!
//! The timestamp only keeps otherwise identical transactions distinct for
//! the transport; it is never interpreted. Trailing fields beyond the
//! required ones are ignored. Every field is hex or a fixed tag, so the
//! delimiter never appears inside one.

use chrono::Utc;

use crate::error::{VaultError, VaultResult};
use crate::storage::keys::DELIMITER;

pub const WRITING_TAG: &str = "writing";
pub const DELETING_TAG: &str = "deleting";

/// Fields required from the tag onwards.
const WRITING_FIELDS: usize = 5;
const DELETING_FIELDS: usize = 4;

/// `20261018T093015.123456Z`, free of the delimiter.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// A decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Writing {
        timestamp: String,
        account: String,
        item_hash: String,
        enc_name: String,
        enc_value: String,
    },
    Deleting {
        timestamp: String,
        account: String,
        item_hash: String,
        enc_name: String,
    },
}

impl Transaction {
    /// Write transaction stamped with the current time.
    pub fn writing(
        account: impl Into<String>,
        item_hash: impl Into<String>,
        enc_name: impl Into<String>,
        enc_value: impl Into<String>,
    ) -> Self {
        Transaction::Writing {
            timestamp: timestamp_now(),
            account: account.into(),
            item_hash: item_hash.into(),
            enc_name: enc_name.into(),
            enc_value: enc_value.into(),
        }
    }

    /// Delete transaction stamped with the current time.
    pub fn deleting(
        account: impl Into<String>,
        item_hash: impl Into<String>,
        enc_name: impl Into<String>,
    ) -> Self {
        Transaction::Deleting {
            timestamp: timestamp_now(),
            account: account.into(),
            item_hash: item_hash.into(),
            enc_name: enc_name.into(),
        }
    }

    /// Decode and check the shape of a raw transaction.
    pub fn parse(raw: &[u8]) -> VaultResult<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| VaultError::InvalidFormat("transaction is not UTF-8".to_string()))?;
        let fields: Vec<&str> = text.split(DELIMITER).collect();

        let Some(tag) = fields.get(1) else {
            return Err(VaultError::InvalidFormat(
                "missing operation tag".to_string(),
            ));
        };
        let timestamp = fields[0].to_string();
        let body = &fields[1..];

        match *tag {
            WRITING_TAG => {
                let [_, account, item_hash, enc_name, enc_value] =
                    required::<WRITING_FIELDS>(WRITING_TAG, body)?;
                Ok(Transaction::Writing {
                    timestamp,
                    account: account.to_string(),
                    item_hash: item_hash.to_string(),
                    enc_name: enc_name.to_string(),
                    enc_value: enc_value.to_string(),
                })
            }
            DELETING_TAG => {
                let [_, account, item_hash, enc_name] =
                    required::<DELETING_FIELDS>(DELETING_TAG, body)?;
                Ok(Transaction::Deleting {
                    timestamp,
                    account: account.to_string(),
                    item_hash: item_hash.to_string(),
                    enc_name: enc_name.to_string(),
                })
            }
            other => Err(VaultError::InvalidFormat(format!(
                "unknown operation tag {other:?}"
            ))),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Transaction::Writing { .. } => WRITING_TAG,
            Transaction::Deleting { .. } => DELETING_TAG,
        }
    }

    pub fn account(&self) -> &str {
        match self {
            Transaction::Writing { account, .. } | Transaction::Deleting { account, .. } => account,
        }
    }

    pub fn item_hash(&self) -> &str {
        match self {
            Transaction::Writing { item_hash, .. } | Transaction::Deleting { item_hash, .. } => {
                item_hash
            }
        }
    }

    /// Encode for the transport.
    pub fn to_wire(&self) -> String {
        let delimiter = DELIMITER.to_string();
        match self {
            Transaction::Writing {
                timestamp,
                account,
                item_hash,
                enc_name,
                enc_value,
            } => [
                timestamp.as_str(),
                WRITING_TAG,
                account.as_str(),
                item_hash.as_str(),
                enc_name.as_str(),
                enc_value.as_str(),
            ]
            .join(delimiter.as_str()),
            Transaction::Deleting {
                timestamp,
                account,
                item_hash,
                enc_name,
            } => [
                timestamp.as_str(),
                DELETING_TAG,
                account.as_str(),
                item_hash.as_str(),
                enc_name.as_str(),
            ]
            .join(delimiter.as_str()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_wire().into_bytes()
    }
}

/// Current UTC time in the wire timestamp format.
pub fn timestamp_now() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// First `N` fields of `body` (tag included), each non-empty past the tag.
fn required<'a, const N: usize>(tag: &str, body: &[&'a str]) -> VaultResult<[&'a str; N]> {
    if body.len() < N {
        return Err(VaultError::InvalidFormat(format!(
            "{tag} needs {N} fields, got {}",
            body.len()
        )));
    }
    let mut out = [""; N];
    out.copy_from_slice(&body[..N]);
    if let Some(pos) = out.iter().skip(1).position(|f| f.is_empty()) {
        return Err(VaultError::InvalidFormat(format!(
            "{tag} field {} is empty",
            pos + 2
        )));
    }
    Ok(out)
}
