//! Signed packet record and its stored form
//!
//! ## Record structure
//!
//! ```text
//! PacketRecord (what travels in archives):
//! ┌─────────────────────────────────────────────────────┐
//! │  kind: PacketKind     - Header / data / attachment  │
//! │  account_id: String   - Author account              │
//! │  local_id: String     - Packet id within account    │
//! │  body: Vec<u8>        - Kind-specific body          │
//! │  signature            - Signs all of the above      │
//! └─────────────────────────────────────────────────────┘
//!
//! Stored form (what the database holds):
//! ┌────────────┬────────────────────────────────────────┐
//! │ frame: u8  │ record bytes, or [nonce][ciphertext]   │
//! └────────────┴────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::kind::PacketKind;
use super::uid::UniversalId;
use crate::crypto::SecurityProvider;
use crate::error::{StoreError, StoreResult};
use crate::identity::PacketSignature;

/// Stored frame tag for a plain record
pub const FRAME_PLAIN: u8 = 0;

/// Stored frame tag for a record encrypted at rest
pub const FRAME_LOCALLY_ENCRYPTED: u8 = 1;

/// A signed packet.
///
/// The signature binds the body to its kind, author and local id, so a
/// record cannot be replayed under another name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    /// What the body holds
    pub kind: PacketKind,
    /// Author account id
    pub account_id: String,
    /// Local id within the author's account
    pub local_id: String,
    /// Kind-specific body
    pub body: Vec<u8>,
    /// Author's signature over kind, account, local id and body
    pub signature: PacketSignature,
}

impl PacketRecord {
    /// Sign a body as `uid` with the provider's identity.
    pub fn create(
        kind: PacketKind,
        uid: &UniversalId,
        body: Vec<u8>,
        security: &dyn SecurityProvider,
    ) -> StoreResult<Self> {
        let sign_payload =
            Self::create_sign_payload(kind, uid.account_id(), uid.local_id(), &body);
        let signature = security.sign(&sign_payload)?;
        Ok(Self {
            kind,
            account_id: uid.account_id().to_string(),
            local_id: uid.local_id().to_string(),
            body,
            signature,
        })
    }

    /// Universal id of this packet
    pub fn uid(&self) -> UniversalId {
        UniversalId::new(self.account_id.clone(), self.local_id.clone())
    }

    /// Verify the signature against the record's own account id.
    pub fn verify(&self, security: &dyn SecurityProvider) -> bool {
        let sign_payload =
            Self::create_sign_payload(self.kind, &self.account_id, &self.local_id, &self.body);
        security.verify(&sign_payload, &self.signature, &self.account_id)
    }

    /// Check that `expected_account` wrote this record and the signature holds.
    pub fn verify_author(
        &self,
        expected_account: &str,
        security: &dyn SecurityProvider,
    ) -> StoreResult<()> {
        if self.account_id != expected_account {
            return Err(StoreError::WrongAccount {
                expected: expected_account.to_string(),
                actual: self.account_id.clone(),
            });
        }
        if !self.verify(security) {
            return Err(StoreError::SignatureVerificationFailed(format!(
                "{} {}",
                self.kind, self.local_id
            )));
        }
        Ok(())
    }

    /// Fail with `WrongPacketType` unless this record is of `expected` kind.
    pub fn expect_kind(&self, expected: PacketKind) -> StoreResult<()> {
        if self.kind != expected {
            return Err(StoreError::WrongPacketType {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            });
        }
        Ok(())
    }

    /// Encode record to bytes.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| StoreError::Serialization(format!("Failed to encode record: {}", e)))
    }

    /// Decode record from bytes.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| StoreError::InvalidPacket(format!("Failed to decode record: {}", e)))
    }

    fn create_sign_payload(kind: PacketKind, account_id: &str, local_id: &str, body: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(13 + account_id.len() + local_id.len() + body.len());
        payload.push(kind.tag());

        payload.extend_from_slice(&(account_id.len() as u32).to_le_bytes());
        payload.extend_from_slice(account_id.as_bytes());

        payload.extend_from_slice(&(local_id.len() as u32).to_le_bytes());
        payload.extend_from_slice(local_id.as_bytes());

        payload.extend_from_slice(&(body.len() as u32).to_le_bytes());
        payload.extend_from_slice(body);

        payload
    }
}

/// Wrap encoded record bytes in the stored frame, encrypting at rest if asked.
pub fn frame_stored(
    record_bytes: &[u8],
    encrypt: bool,
    security: &dyn SecurityProvider,
) -> StoreResult<Vec<u8>> {
    let (frame, content) = if encrypt {
        (FRAME_LOCALLY_ENCRYPTED, security.encrypt(record_bytes)?)
    } else {
        (FRAME_PLAIN, record_bytes.to_vec())
    };
    let mut stored = Vec::with_capacity(1 + content.len());
    stored.push(frame);
    stored.extend_from_slice(&content);
    Ok(stored)
}

/// Recover encoded record bytes from the stored frame.
pub fn unframe_stored(stored: &[u8], security: &dyn SecurityProvider) -> StoreResult<Vec<u8>> {
    match stored.split_first() {
        Some((&FRAME_PLAIN, rest)) => Ok(rest.to_vec()),
        Some((&FRAME_LOCALLY_ENCRYPTED, rest)) => security.decrypt(rest),
        Some((frame, _)) => Err(StoreError::InvalidPacket(format!(
            "Unknown stored frame {}",
            frame
        ))),
        None => Err(StoreError::InvalidPacket("Empty stored packet".to_string())),
    }
}

/// Whether stored bytes are encrypted at rest
pub fn is_locally_encrypted(stored: &[u8]) -> bool {
    stored.first() == Some(&FRAME_LOCALLY_ENCRYPTED)
}
