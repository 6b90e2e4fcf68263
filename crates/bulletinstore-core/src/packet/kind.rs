//! Closed set of packet kinds

use serde::{Deserialize, Serialize};

/// What a stored packet holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    /// Bulletin header: metadata and references to the other packets
    Header,
    /// Public field data
    PublicData,
    /// Private field data
    PrivateData,
    /// File attachment (public or private)
    Attachment,
}

impl PacketKind {
    /// Stable byte tag, part of the signed bytes
    pub fn tag(self) -> u8 {
        match self {
            PacketKind::Header => 1,
            PacketKind::PublicData => 2,
            PacketKind::PrivateData => 3,
            PacketKind::Attachment => 4,
        }
    }

    /// Local id prefix for packets of this kind
    pub fn local_id_prefix(self) -> &'static str {
        match self {
            PacketKind::Header => "B",
            PacketKind::PublicData | PacketKind::PrivateData => "F",
            PacketKind::Attachment => "A",
        }
    }

    /// Whether `local_id` has this kind's prefix
    pub fn expects_local_id(self, local_id: &str) -> bool {
        local_id
            .strip_prefix(self.local_id_prefix())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Whether `local_id` names a header packet
    pub fn is_header_local_id(local_id: &str) -> bool {
        PacketKind::Header.expects_local_id(local_id)
    }

    /// Whether a packet of this kind is written through the local
    /// encryption filter on import.
    ///
    /// Imported headers are stored plain; saves encrypt them like any other
    /// packet when asked to.
    pub fn needs_local_encryption(self) -> bool {
        !matches!(self, PacketKind::Header)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Header => "header",
            PacketKind::PublicData => "public field data",
            PacketKind::PrivateData => "private field data",
            PacketKind::Attachment => "attachment",
        }
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
