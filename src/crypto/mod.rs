// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Crypto Engine
//!
//! Stateless primitives shared by the write path and the read path:
//!
//! - `hash` / `hash_hex` - SHA-256, used to build lookup keys. Never used where
//!   the input has to be recovered.
//! - `encrypt` / `decrypt` - XChaCha20-Poly1305 with a random 24-byte nonce
//!   prepended to the ciphertext, so two encryptions of the same value never
//!   collide.
//!
//! Keys are never stored. Every key is `hash(composite)` of the secrets that
//! guard the value (see [`derive`]), so only a holder of those secrets can
//! rebuild it.

pub mod derive;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    Key, XChaCha20Poly1305, XNonce,
};
use sha2::{Digest, Sha256};

pub use derive::{KeyMaterial, MasterCredentials};

/// Width of every digest produced by [`hash`].
pub const HASH_LEN: usize = 32;

/// XChaCha20 nonce length, prepended to every ciphertext.
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Fixed-width digest.
pub type Hash = [u8; HASH_LEN];

/// Errors raised by the crypto engine.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The OS entropy source could not produce a nonce.
    #[error("entropy source unavailable: {0}")]
    Entropy(getrandom::Error),

    /// Plaintext exceeds what the AEAD can seal.
    #[error("encryption failed")]
    Encryption,

    /// Ciphertext is malformed, truncated, or was sealed under another key.
    #[error("decryption failed: {0}")]
    Decryption(&'static str),
}

/// SHA-256 of `data`.
pub fn hash(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Lower-case hex of [`hash`].
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash(data))
}

/// Seal `plaintext` under `key`. Output is `nonce || ciphertext || tag`.
pub fn encrypt(key: &KeyMaterial, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::fill(&mut nonce).map_err(CryptoError::Entropy)?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let sealed = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Open a value produced by [`encrypt`].
pub fn decrypt(key: &KeyMaterial, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Decryption("ciphertext too short"));
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CryptoError::Decryption("authentication tag mismatch"))
}

/// [`encrypt`] a UTF-8 string and hex-encode the result for the wire format.
pub fn encrypt_hex(key: &KeyMaterial, plaintext: &str) -> Result<String, CryptoError> {
    encrypt(key, plaintext.as_bytes()).map(hex::encode)
}

/// Inverse of [`encrypt_hex`].
pub fn decrypt_hex(key: &KeyMaterial, ciphertext_hex: &str) -> Result<String, CryptoError> {
    let ciphertext =
        hex::decode(ciphertext_hex).map_err(|_| CryptoError::Decryption("invalid hex"))?;
    let plaintext = decrypt(key, &ciphertext)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption("plaintext is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_fixed_width() {
        assert_eq!(hash(b"savedName1"), hash(b"savedName1"));
        assert_ne!(hash(b"savedName1"), hash(b"savedName2"));
        assert_eq!(hash_hex(b"").len(), HASH_LEN * 2);
    }

    #[test]
    fn hash_hex_matches_known_vector() {
        assert_eq!(
            hash_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn encrypt_round_trips() {
        let key = KeyMaterial::derive("masterUsr/masterPwd");
        let sealed = encrypt(&key, b"savedPass1").unwrap();
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"savedPass1");
    }

    #[test]
    fn nonce_makes_ciphertexts_unique() {
        let key = KeyMaterial::derive("k");
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), NONCE_LEN + 4 + TAG_LEN);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let sealed = encrypt(&KeyMaterial::derive("right"), b"secret").unwrap();
        let result = decrypt(&KeyMaterial::derive("wrong"), &sealed);
        assert!(matches!(result, Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn short_or_tampered_ciphertext_is_rejected() {
        let key = KeyMaterial::derive("k");
        assert!(matches!(
            decrypt(&key, &[0u8; NONCE_LEN]),
            Err(CryptoError::Decryption("ciphertext too short"))
        ));

        let mut sealed = encrypt(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn hex_helpers_round_trip_and_reject_garbage() {
        let key = KeyMaterial::derive("k");
        let token = encrypt_hex(&key, "savedName1").unwrap();
        assert!(!token.contains('/'));
        assert_eq!(decrypt_hex(&key, &token).unwrap(), "savedName1");
        assert!(decrypt_hex(&key, "not-hex").is_err());
    }
}
