//! ChaCha20-Poly1305 cipher keyed from an account seed
//!
//! Used for content-level encryption of packets marked encrypted and for
//! at-rest encryption of whole stored records.
//!
//! Output layout: `[nonce (12)] [ciphertext] [tag (16)]`. The cipher's
//! context label is bound as associated data, so ciphertext made under one
//! label never decrypts under another.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{StoreError, StoreResult};

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

const KEY_SALT: &[u8] = b"bulletinstore-local-key";

/// Symmetric cipher for one account and one context label.
///
/// ```
/// use bulletinstore_core::crypto::LocalCipher;
///
/// let cipher = LocalCipher::derive(&[7u8; 32], b"example").unwrap();
/// let sealed = cipher.encrypt(b"witness statement").unwrap();
/// assert_eq!(cipher.decrypt(&sealed).unwrap(), b"witness statement");
/// ```
pub struct LocalCipher {
    cipher: ChaCha20Poly1305,
    context: &'static [u8],
}

impl LocalCipher {
    /// Derive the key from `seed` with HKDF-SHA256, using `context` as both
    /// the HKDF info and the associated data.
    pub fn derive(seed: &[u8], context: &'static [u8]) -> StoreResult<Self> {
        let mut key = [0u8; 32];
        Hkdf::<Sha256>::new(Some(KEY_SALT), seed)
            .expand(context, &mut key)
            .map_err(|e| StoreError::Crypto(format!("Key derivation failed: {}", e)))?;
        Ok(Self {
            cipher: ChaCha20Poly1305::new((&key).into()),
            context,
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> StoreResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: self.context,
                },
            )
            .map_err(|e| StoreError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Fails with `DecryptionFailed` on a wrong key or label, tampering, or
    /// input shorter than a nonce plus tag.
    pub fn decrypt(&self, data: &[u8]) -> StoreResult<Vec<u8>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StoreError::DecryptionFailed(format!(
                "{} bytes is too short for a sealed payload",
                data.len()
            )));
        }
        let (nonce, sealed) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: self.context,
                },
            )
            .map_err(|_| StoreError::DecryptionFailed("authentication failed".to_string()))
    }
}
