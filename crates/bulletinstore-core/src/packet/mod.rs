//! Packet model
//!
//! A bulletin revision is stored as separate packets: one header, a public
//! and a private field-data packet, and any number of attachments. Every
//! packet is signed on its own as a [`PacketRecord`].

mod data;
mod header;
mod kind;
mod record;
mod uid;

pub use data::{AttachmentPacket, FieldDataPacket};
pub use header::{HeaderPacket, ReaderKey};
pub use kind::PacketKind;
pub use record::{
    frame_stored, is_locally_encrypted, unframe_stored, PacketRecord, FRAME_LOCALLY_ENCRYPTED,
    FRAME_PLAIN,
};
pub use uid::{DatabaseKey, RevisionStatus, UniversalId};
