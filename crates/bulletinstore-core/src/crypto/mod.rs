//! Cryptographic capability consumed by the store
//!
//! The store never touches key material directly. It signs, verifies,
//! encrypts and decrypts through a [`SecurityProvider`], so a different key
//! backend can be plugged in without changing packet handling.

mod cipher;
mod security;

pub use cipher::{LocalCipher, NONCE_SIZE, TAG_SIZE};
pub use security::AccountSecurity;

use crate::error::StoreResult;
use crate::identity::{verify_signature, PacketSignature};

/// Sign/verify/encrypt/decrypt capability for one signing identity.
pub trait SecurityProvider: Send + Sync {
    /// Account id of the signing identity
    fn account_id(&self) -> StoreResult<String>;

    /// Sign bytes with the signing identity
    fn sign(&self, data: &[u8]) -> StoreResult<PacketSignature>;

    /// Verify a signature against any account id
    fn verify(&self, data: &[u8], signature: &PacketSignature, account_id: &str) -> bool {
        verify_signature(account_id, data, signature)
    }

    /// Encrypt bytes so only the signing identity can read them
    fn encrypt(&self, plaintext: &[u8]) -> StoreResult<Vec<u8>>;

    /// Decrypt bytes produced by [`SecurityProvider::encrypt`]
    fn decrypt(&self, ciphertext: &[u8]) -> StoreResult<Vec<u8>>;
}
