//! In-memory bulletin aggregate

use crate::error::StoreResult;
use crate::packet::{
    AttachmentPacket, DatabaseKey, FieldDataPacket, HeaderPacket, PacketKind, ReaderKey,
    RevisionStatus, UniversalId,
};

/// One bulletin revision as the caller edits it.
///
/// Owns the header, both field-data packets, and the attachments added since
/// the last save. Pending attachments are written by the next save and then
/// cleared; their ids stay in the header.
#[derive(Debug, Clone)]
pub struct Bulletin {
    header: HeaderPacket,
    public_data: FieldDataPacket,
    private_data: FieldDataPacket,
    pending_public_attachments: Vec<AttachmentPacket>,
    pending_private_attachments: Vec<AttachmentPacket>,
}

impl Bulletin {
    /// Create an empty draft bulletin with fresh ids for `account_id`.
    pub fn new(account_id: &str) -> Self {
        let uid = UniversalId::generate(account_id, PacketKind::Header);
        let public_data = FieldDataPacket::new(UniversalId::generate(account_id, PacketKind::PublicData));
        let mut private_data =
            FieldDataPacket::new(UniversalId::generate(account_id, PacketKind::PrivateData));
        private_data.set_encrypted(true);

        let mut header = HeaderPacket::new(uid);
        header.set_field_data_id(public_data.local_id());
        header.set_private_field_data_id(private_data.local_id());

        Self {
            header,
            public_data,
            private_data,
            pending_public_attachments: Vec::new(),
            pending_private_attachments: Vec::new(),
        }
    }

    /// Reassemble a loaded revision.
    pub fn from_packets(
        header: HeaderPacket,
        public_data: FieldDataPacket,
        private_data: FieldDataPacket,
    ) -> Self {
        Self {
            header,
            public_data,
            private_data,
            pending_public_attachments: Vec::new(),
            pending_private_attachments: Vec::new(),
        }
    }

    /// Start an edited revision of this bulletin.
    ///
    /// The new revision gets a fresh uid and records this revision as its
    /// latest ancestor. Field payloads, readers and privacy carry over;
    /// attachments must be added again.
    pub fn new_revision(&self) -> StoreResult<Bulletin> {
        let mut next = Bulletin::new(self.account_id());

        let mut history = self.header.history().to_vec();
        history.push(self.local_id().to_string());
        next.header.set_history(history)?;
        next.header.set_all_private(self.header.is_all_private());
        next.header
            .set_all_readers_proxy_upload(self.header.all_readers_proxy_upload());
        next.header
            .set_authorized_readers(self.header.authorized_readers().clone());

        next.public_data.set_payload(self.public_data.payload().to_vec());
        next.private_data.set_payload(self.private_data.payload().to_vec());
        Ok(next)
    }

    pub fn uid(&self) -> &UniversalId {
        self.header.uid()
    }

    pub fn account_id(&self) -> &str {
        self.header.account_id()
    }

    pub fn local_id(&self) -> &str {
        self.header.local_id()
    }

    /// Storage address of this revision's header
    pub fn database_key(&self) -> DatabaseKey {
        DatabaseKey::new(self.uid().clone(), self.header.status())
    }

    pub fn header(&self) -> &HeaderPacket {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut HeaderPacket {
        &mut self.header
    }

    pub fn public_data(&self) -> &FieldDataPacket {
        &self.public_data
    }

    pub fn private_data(&self) -> &FieldDataPacket {
        &self.private_data
    }

    pub(crate) fn field_data_mut(&mut self) -> (&mut HeaderPacket, &mut FieldDataPacket, &mut FieldDataPacket) {
        (&mut self.header, &mut self.public_data, &mut self.private_data)
    }

    pub fn set_public_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.public_data.set_payload(payload);
    }

    pub fn set_private_payload(&mut self, payload: impl Into<Vec<u8>>) {
        self.private_data.set_payload(payload);
    }

    pub fn is_draft(&self) -> bool {
        self.header.is_draft()
    }

    pub fn set_draft(&mut self) {
        self.header.set_status(RevisionStatus::Draft);
    }

    pub fn set_sealed(&mut self) {
        self.header.set_status(RevisionStatus::Sealed);
    }

    pub fn is_all_private(&self) -> bool {
        self.header.is_all_private()
    }

    pub fn set_all_private(&mut self, all_private: bool) {
        self.header.set_all_private(all_private);
    }

    pub fn history(&self) -> &[String] {
        self.header.history()
    }

    pub fn add_authorized_reader(&mut self, reader: ReaderKey) {
        self.header.add_authorized_reader(reader);
    }

    /// Attach a public file; returns the new attachment's uid.
    pub fn add_public_attachment(
        &mut self,
        filename: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> UniversalId {
        let attachment = AttachmentPacket::new(
            UniversalId::generate(self.account_id(), PacketKind::Attachment),
            filename,
            payload,
        );
        let uid = attachment.uid().clone();
        self.header.add_public_attachment_id(uid.local_id());
        self.pending_public_attachments.push(attachment);
        uid
    }

    /// Attach a private file; its content is always encrypted.
    pub fn add_private_attachment(
        &mut self,
        filename: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> UniversalId {
        let mut attachment = AttachmentPacket::new(
            UniversalId::generate(self.account_id(), PacketKind::Attachment),
            filename,
            payload,
        );
        attachment.set_encrypted(true);
        let uid = attachment.uid().clone();
        self.header.add_private_attachment_id(uid.local_id());
        self.pending_private_attachments.push(attachment);
        uid
    }

    /// Drop an attachment from this revision, pending or already saved.
    ///
    /// Saved packets are discarded by the next save of this revision.
    pub fn remove_attachment(&mut self, local_id: &str) {
        let public: Vec<String> = self
            .header
            .public_attachment_ids()
            .iter()
            .filter(|id| id.as_str() != local_id)
            .cloned()
            .collect();
        let private: Vec<String> = self
            .header
            .private_attachment_ids()
            .iter()
            .filter(|id| id.as_str() != local_id)
            .cloned()
            .collect();
        self.header.set_public_attachment_ids(public);
        self.header.set_private_attachment_ids(private);
        self.pending_public_attachments
            .retain(|a| a.local_id() != local_id);
        self.pending_private_attachments
            .retain(|a| a.local_id() != local_id);
    }

    pub fn pending_public_attachments(&self) -> &[AttachmentPacket] {
        &self.pending_public_attachments
    }

    pub fn pending_private_attachments(&self) -> &[AttachmentPacket] {
        &self.pending_private_attachments
    }

    pub(crate) fn pending_attachments_mut(&mut self) -> impl Iterator<Item = &mut AttachmentPacket> {
        self.pending_public_attachments
            .iter_mut()
            .chain(self.pending_private_attachments.iter_mut())
    }

    pub(crate) fn clear_pending_attachments(&mut self) {
        self.pending_public_attachments.clear();
        self.pending_private_attachments.clear();
    }
}
