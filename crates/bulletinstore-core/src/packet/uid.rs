//! Packet identity and database addressing

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use super::kind::PacketKind;
use crate::error::StoreError;

/// Globally unique name of one packet: author account + local id.
///
/// Local ids carry a kind prefix (`B-`, `F-`, `A-`) followed by a ULID, so
/// they sort by creation time within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniversalId {
    account_id: String,
    local_id: String,
}

impl UniversalId {
    /// Create a uid from its two parts
    pub fn new(account_id: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            local_id: local_id.into(),
        }
    }

    /// Create a fresh uid for a packet of the given kind
    pub fn generate(account_id: impl Into<String>, kind: PacketKind) -> Self {
        Self::new(
            account_id,
            format!("{}-{}", kind.local_id_prefix(), Ulid::new()),
        )
    }

    /// Author account id
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Local id within the account
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Same account, different local id
    pub fn sibling(&self, local_id: impl Into<String>) -> Self {
        Self::new(self.account_id.clone(), local_id)
    }
}

impl std::fmt::Display for UniversalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.account_id, self.local_id)
    }
}

/// Revision status tag of a stored packet set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RevisionStatus {
    /// In-progress edit
    Draft,
    /// Finalized revision
    Sealed,
    /// Written before revision status was tracked
    Legacy,
}

impl RevisionStatus {
    /// Single-character tag used in storage keys
    pub fn as_char(self) -> char {
        match self {
            RevisionStatus::Draft => 'D',
            RevisionStatus::Sealed => 'S',
            RevisionStatus::Legacy => 'L',
        }
    }

    /// Parse the storage key tag
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'D' => Some(RevisionStatus::Draft),
            'S' => Some(RevisionStatus::Sealed),
            'L' => Some(RevisionStatus::Legacy),
            _ => None,
        }
    }

    /// Value of the header's `BulletinStatus` tag, `None` for legacy headers
    pub fn header_text(self) -> Option<&'static str> {
        match self {
            RevisionStatus::Draft => Some("draft"),
            RevisionStatus::Sealed => Some("sealed"),
            RevisionStatus::Legacy => None,
        }
    }

    /// Interpret a `BulletinStatus` tag value; unrecognized values are legacy
    pub fn from_header_text(text: &str) -> Self {
        match text.trim() {
            "draft" => RevisionStatus::Draft,
            "sealed" => RevisionStatus::Sealed,
            _ => RevisionStatus::Legacy,
        }
    }
}

/// Address of one stored packet: uid plus revision status.
///
/// Equal uids with different statuses are different storage slots, so a
/// draft never overwrites its sealed counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseKey {
    uid: UniversalId,
    status: RevisionStatus,
}

impl DatabaseKey {
    /// Key with an explicit status
    pub fn new(uid: UniversalId, status: RevisionStatus) -> Self {
        Self { uid, status }
    }

    /// Draft key for a uid
    pub fn draft(uid: UniversalId) -> Self {
        Self::new(uid, RevisionStatus::Draft)
    }

    /// Sealed key for a uid
    pub fn sealed(uid: UniversalId) -> Self {
        Self::new(uid, RevisionStatus::Sealed)
    }

    /// Legacy key for a uid
    pub fn legacy(uid: UniversalId) -> Self {
        Self::new(uid, RevisionStatus::Legacy)
    }

    /// The uid this key addresses
    pub fn uid(&self) -> &UniversalId {
        &self.uid
    }

    /// Revision status
    pub fn status(&self) -> RevisionStatus {
        self.status
    }

    /// Account id of the addressed packet
    pub fn account_id(&self) -> &str {
        self.uid.account_id()
    }

    /// Local id of the addressed packet
    pub fn local_id(&self) -> &str {
        self.uid.local_id()
    }

    /// Key for another packet of the same account with the same status
    pub fn sibling(&self, local_id: impl Into<String>) -> Self {
        Self::new(self.uid.sibling(local_id), self.status)
    }

    /// Flat string form used as the database row key.
    ///
    /// Format: `<status char>:<account id>:<local id>`
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.status.as_char(),
            self.uid.account_id(),
            self.uid.local_id()
        )
    }

    /// Parse a row key written by [`DatabaseKey::storage_key`]
    ///
    /// The local id is taken after the last `:`, so account ids may contain
    /// colons.
    pub fn from_storage_key(key: &str) -> Result<Self, StoreError> {
        let bad_key = || StoreError::InvalidPacket(format!("Bad storage key: {}", key));
        let (status, uid) = key.split_once(':').ok_or_else(bad_key)?;
        let mut chars = status.chars();
        let status = match (chars.next(), chars.next()) {
            (Some(c), None) => RevisionStatus::from_char(c),
            _ => None,
        }
        .ok_or_else(bad_key)?;
        match uid.rsplit_once(':') {
            Some((account, local)) if !account.is_empty() && !local.is_empty() => {
                Ok(Self::new(UniversalId::new(account, local), status))
            }
            _ => Err(bad_key()),
        }
    }
}

impl std::fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.uid, self.status.as_char())
    }
}
