//! Field-data and attachment packets
//!
//! Payloads are opaque bytes. When a packet is marked `encrypted` the
//! payload is encrypted with the author's key before the record is signed,
//! so the ciphertext is what travels in archives.

use serde::{Deserialize, Serialize};

use super::uid::UniversalId;
use crate::crypto::SecurityProvider;
use crate::error::{StoreError, StoreResult};

/// Record body shared by both packet types
#[derive(Serialize, Deserialize)]
struct DataBody {
    encrypted: bool,
    content: Vec<u8>,
}

/// Attachment content before optional encryption
#[derive(Serialize, Deserialize)]
struct AttachmentContent {
    filename: String,
    payload: Vec<u8>,
}

fn encode_body(
    encrypted: bool,
    content: &[u8],
    security: &dyn SecurityProvider,
) -> StoreResult<Vec<u8>> {
    let content = if encrypted {
        security.encrypt(content)?
    } else {
        content.to_vec()
    };
    postcard::to_allocvec(&DataBody { encrypted, content })
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_body(body: &[u8], security: &dyn SecurityProvider) -> StoreResult<(bool, Vec<u8>)> {
    let body: DataBody = postcard::from_bytes(body)
        .map_err(|e| StoreError::InvalidPacket(format!("Data body: {}", e)))?;
    let content = if body.encrypted {
        security.decrypt(&body.content)?
    } else {
        body.content
    };
    Ok((body.encrypted, content))
}

/// Public or private field data of one bulletin revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDataPacket {
    uid: UniversalId,
    encrypted: bool,
    payload: Vec<u8>,
}

impl FieldDataPacket {
    pub fn new(uid: UniversalId) -> Self {
        Self {
            uid,
            encrypted: false,
            payload: Vec::new(),
        }
    }

    pub fn uid(&self) -> &UniversalId {
        &self.uid
    }

    pub fn local_id(&self) -> &str {
        self.uid.local_id()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.payload = payload.into();
    }

    pub(crate) fn encode(&self, security: &dyn SecurityProvider) -> StoreResult<Vec<u8>> {
        encode_body(self.encrypted, &self.payload, security)
    }

    pub(crate) fn decode(
        uid: UniversalId,
        body: &[u8],
        security: &dyn SecurityProvider,
    ) -> StoreResult<Self> {
        let (encrypted, payload) = decode_body(body, security)?;
        Ok(Self {
            uid,
            encrypted,
            payload,
        })
    }
}

/// A file attached to a bulletin.
///
/// The filename travels inside the (possibly encrypted) content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPacket {
    uid: UniversalId,
    encrypted: bool,
    filename: String,
    payload: Vec<u8>,
}

impl AttachmentPacket {
    pub fn new(uid: UniversalId, filename: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            uid,
            encrypted: false,
            filename: filename.into(),
            payload: payload.into(),
        }
    }

    pub fn uid(&self) -> &UniversalId {
        &self.uid
    }

    pub fn local_id(&self) -> &str {
        self.uid.local_id()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn encode(&self, security: &dyn SecurityProvider) -> StoreResult<Vec<u8>> {
        let content = postcard::to_allocvec(&AttachmentContent {
            filename: self.filename.clone(),
            payload: self.payload.clone(),
        })
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
        encode_body(self.encrypted, &content, security)
    }

    pub(crate) fn decode(
        uid: UniversalId,
        body: &[u8],
        security: &dyn SecurityProvider,
    ) -> StoreResult<Self> {
        let (encrypted, content) = decode_body(body, security)?;
        let content: AttachmentContent = postcard::from_bytes(&content)
            .map_err(|e| StoreError::InvalidPacket(format!("Attachment content: {}", e)))?;
        Ok(Self {
            uid,
            encrypted,
            filename: content.filename,
            payload: content.payload,
        })
    }
}
