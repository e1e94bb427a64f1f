// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vault error taxonomy.
//!
//! Presentation layers only need the three stable categories from
//! [`VaultError::category`]; the variants keep the detail for logs.

use crate::crypto::CryptoError;
use crate::storage::StoreError;

/// User-facing error category. Stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credentials do not open any account.
    AuthenticationFailed,
    /// The item is unknown or not accessible with these credentials.
    InvalidItem,
    /// Input could not be parsed.
    MalformedInput,
    /// Failure inside the vault itself.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Malformed transaction shape.
    #[error("invalid transaction format: {0}")]
    InvalidFormat(String),

    /// A record the transaction refers to is absent.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("no such account")]
    NoSuchAccount,

    #[error("no such item")]
    NoSuchItem,

    /// Ciphertext malformed or sealed under other credentials.
    #[error("decryption failed")]
    Decryption,

    /// Index record, item records and root linkage disagree.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Process I/O outside the byte store, such as the transaction stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("writer lock poisoned")]
    LockPoisoned,

    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Decryption(_) => VaultError::Decryption,
            other => VaultError::Crypto(other),
        }
    }
}

impl VaultError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultError::NoSuchAccount => ErrorCategory::AuthenticationFailed,
            VaultError::NoSuchItem | VaultError::Decryption | VaultError::PreconditionFailed(_) => {
                ErrorCategory::InvalidItem
            }
            VaultError::InvalidFormat(_) => ErrorCategory::MalformedInput,
            VaultError::ConsistencyViolation(_)
            | VaultError::Crypto(_)
            | VaultError::Store(_)
            | VaultError::Io(_)
            | VaultError::LockPoisoned
            | VaultError::Broadcast(_) => ErrorCategory::Internal,
        }
    }

    /// Machine-readable code for logs and transport responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            VaultError::InvalidFormat(_) => "invalid_format",
            VaultError::PreconditionFailed(_) => "precondition_failed",
            VaultError::NoSuchAccount => "no_such_account",
            VaultError::NoSuchItem => "no_such_item",
            VaultError::Decryption => "decryption_failed",
            VaultError::ConsistencyViolation(_) => "consistency_violation",
            VaultError::Crypto(_) => "crypto_failure",
            VaultError::Store(_) => "storage_failure",
            VaultError::Io(_) => "io_failure",
            VaultError::LockPoisoned => "lock_poisoned",
            VaultError::Broadcast(_) => "broadcast_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_keep_the_three_user_facing_kinds_apart() {
        assert_eq!(
            VaultError::NoSuchAccount.category(),
            ErrorCategory::AuthenticationFailed
        );
        assert_eq!(VaultError::NoSuchItem.category(), ErrorCategory::InvalidItem);
        assert_eq!(VaultError::Decryption.category(), ErrorCategory::InvalidItem);
        assert_eq!(
            VaultError::InvalidFormat("x".into()).category(),
            ErrorCategory::MalformedInput
        );
        assert_eq!(VaultError::LockPoisoned.category(), ErrorCategory::Internal);
    }

    #[test]
    fn decryption_errors_collapse_into_one_variant() {
        let err: VaultError = CryptoError::Decryption("authentication tag mismatch").into();
        assert!(matches!(err, VaultError::Decryption));
        assert_eq!(err.error_code(), "decryption_failed");

        let err: VaultError = CryptoError::Encryption.into();
        assert!(matches!(err, VaultError::Crypto(CryptoError::Encryption)));
    }

    #[test]
    fn stream_io_errors_are_not_storage_failures() {
        let err: VaultError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, VaultError::Io(_)));
        assert_eq!(err.error_code(), "io_failure");
        assert_eq!(err.category(), ErrorCategory::Internal);

        let err: VaultError = StoreError::Missing("node/00".into()).into();
        assert_eq!(err.error_code(), "storage_failure");
    }

    #[test]
    fn display_includes_detail() {
        let err = VaultError::PreconditionFailed("record to delete does not exist".into());
        assert_eq!(
            err.to_string(),
            "precondition failed: record to delete does not exist"
        );
    }
}
