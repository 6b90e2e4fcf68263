//! Ed25519 account keypair
//!
//! The keypair signs every packet an account writes. Its 32-byte seed is also
//! the input key material for the account's local encryption key.

use crate::error::StoreError;
use crate::identity::signature::PacketSignature;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

/// Signing keypair for one account.
pub struct AccountKeypair {
    signing: SigningKey,
}

impl AccountKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Build a deterministic keypair from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// The verifying half of this keypair
    pub fn public_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Account id: base58 of the verifying key bytes
    pub fn account_id(&self) -> String {
        bs58::encode(self.public_key().as_bytes()).into_string()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> PacketSignature {
        PacketSignature::new(self.signing.sign(message))
    }

    /// Raw seed bytes, used for key derivation and persistence
    pub(crate) fn seed(&self) -> &[u8; 32] {
        self.signing.as_bytes()
    }

    /// Serialize the private key to bytes
    ///
    /// Format: [ed25519_seed: 32 bytes]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.signing.as_bytes().to_vec()
    }

    /// Deserialize a keypair from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::Crypto(format!("Keypair must be 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(&seed))
    }
}

impl Clone for AccountKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(self.signing.as_bytes())
    }
}

impl std::fmt::Debug for AccountKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKeypair")
            .field("account_id", &self.account_id())
            .finish_non_exhaustive()
    }
}

/// Decode an account id back into its verifying key.
pub(crate) fn verifying_key_for(account_id: &str) -> Option<VerifyingKey> {
    let bytes = bs58::decode(account_id).into_vec().ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

/// Verify `signature` over `message` against the key named by `account_id`.
///
/// A malformed account id never verifies.
pub fn verify_signature(account_id: &str, message: &[u8], signature: &PacketSignature) -> bool {
    match verifying_key_for(account_id) {
        Some(key) => key.verify(message, signature.inner()).is_ok(),
        None => false,
    }
}
