//! Packet signature wrapper

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::Signature as Ed25519Signature;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;

/// Ed25519 signature over one packet.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketSignature {
    inner: Ed25519Signature,
}

impl PacketSignature {
    /// Signature length in bytes
    pub const LEN: usize = 64;

    pub(crate) fn new(inner: Ed25519Signature) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Ed25519Signature {
        &self.inner
    }

    /// Serialize the signature to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes().to_vec()
    }

    /// Deserialize a signature from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let bytes: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            StoreError::InvalidPacket(format!(
                "Signature must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::new(Ed25519Signature::from_bytes(&bytes)))
    }

    /// Base64 form, as written into header packets
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.inner.to_bytes())
    }

    /// Parse the base64 form
    pub fn from_base64(encoded: &str) -> Result<Self, StoreError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| StoreError::InvalidPacket(format!("Bad signature encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for PacketSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PacketSignature")
            .field(&hex::encode(&self.inner.to_bytes()[..8]))
            .finish()
    }
}

impl Serialize for PacketSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for PacketSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}
