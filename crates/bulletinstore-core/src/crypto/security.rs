//! Account-backed security provider
//!
//! Signs with the account's Ed25519 key and encrypts with a ChaCha20-Poly1305
//! key derived from the same seed, so only the author can read packets it
//! encrypted.

use super::cipher::LocalCipher;
use super::SecurityProvider;
use crate::error::{StoreError, StoreResult};
use crate::identity::{AccountKeypair, PacketSignature};

const PACKET_CONTEXT: &[u8] = b"bulletinstore-v1-packet-encryption";

/// `SecurityProvider` backed by an optional account keypair.
///
/// Without a keypair the provider can still verify signatures, but signing,
/// encryption and decryption fail with [`StoreError::MissingKeyPair`].
pub struct AccountSecurity {
    keypair: Option<AccountKeypair>,
    cipher: Option<LocalCipher>,
}

impl AccountSecurity {
    /// Create a provider for the given keypair.
    pub fn new(keypair: AccountKeypair) -> StoreResult<Self> {
        let cipher = LocalCipher::derive(keypair.seed(), PACKET_CONTEXT)?;
        Ok(Self {
            keypair: Some(keypair),
            cipher: Some(cipher),
        })
    }

    /// Create a provider with a freshly generated keypair.
    pub fn generate() -> StoreResult<Self> {
        Self::new(AccountKeypair::generate())
    }

    /// A verify-only provider with no signing identity.
    pub fn without_keypair() -> Self {
        Self {
            keypair: None,
            cipher: None,
        }
    }

    /// The keypair, if one is loaded
    pub fn keypair(&self) -> Option<&AccountKeypair> {
        self.keypair.as_ref()
    }

    fn cipher(&self) -> StoreResult<&LocalCipher> {
        self.cipher.as_ref().ok_or(StoreError::MissingKeyPair)
    }
}

impl SecurityProvider for AccountSecurity {
    fn account_id(&self) -> StoreResult<String> {
        self.keypair
            .as_ref()
            .map(AccountKeypair::account_id)
            .ok_or(StoreError::MissingKeyPair)
    }

    fn sign(&self, data: &[u8]) -> StoreResult<PacketSignature> {
        self.keypair
            .as_ref()
            .map(|k| k.sign(data))
            .ok_or(StoreError::MissingKeyPair)
    }

    fn encrypt(&self, plaintext: &[u8]) -> StoreResult<Vec<u8>> {
        self.cipher()?.encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> StoreResult<Vec<u8>> {
        self.cipher()?.decrypt(ciphertext)
    }
}

impl std::fmt::Debug for AccountSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSecurity")
            .field("keypair", &self.keypair)
            .finish_non_exhaustive()
    }
}
