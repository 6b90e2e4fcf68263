//! Bulletin header packet and its tagged text form
//!
//! The header is the packet that makes a revision loadable: it names the two
//! field-data packets (with their signatures), the attachment lists, the
//! ancestry history and the accounts allowed to read private data.
//!
//! # Text format
//!
//! One tag per line. Leaf values are XML-escaped; blocks open and close on
//! their own lines:
//!
//! ```text
//! <BulletinHeaderPacket>
//! <BulletinLocalId>B-01J...</BulletinLocalId>
//! <BulletinStatus>sealed</BulletinStatus>
//! <History>
//! <Ancestor>B-01H...</Ancestor>
//! </History>
//! ...
//! </BulletinHeaderPacket>
//! ```
//!
//! Unknown leaf tags and the contents of unknown blocks are skipped.

use std::collections::BTreeSet;

use chrono::Utc;

use super::kind::PacketKind;
use super::record::PacketRecord;
use super::uid::{RevisionStatus, UniversalId};
use crate::error::{StoreError, StoreResult};
use crate::identity::PacketSignature;

const ROOT_TAG: &str = "BulletinHeaderPacket";
const TAG_LOCAL_ID: &str = "BulletinLocalId";
const TAG_STATUS: &str = "BulletinStatus";
const TAG_LAST_SAVED: &str = "LastSavedTime";
const TAG_ALL_PRIVATE: &str = "AllPrivate";
const TAG_PROXY_UPLOAD: &str = "AllHQsProxyUpload";
const TAG_DATA_ID: &str = "DataPacketId";
const TAG_DATA_SIG: &str = "DataPacketSig";
const TAG_PRIVATE_DATA_ID: &str = "PrivateDataPacketId";
const TAG_PRIVATE_DATA_SIG: &str = "PrivateDataPacketSig";
const TAG_LEGACY_READER: &str = "HQPublicKey";
const TAG_HISTORY: &str = "History";
const TAG_ANCESTOR: &str = "Ancestor";
const TAG_PUBLIC_ATTACHMENTS: &str = "PublicAttachments";
const TAG_PRIVATE_ATTACHMENTS: &str = "PrivateAttachments";
const TAG_ATTACHMENT: &str = "Attachment";
const TAG_READERS: &str = "AccountsAuthorizedToRead";
const TAG_READER_KEY: &str = "PublicKey";
const TAG_READER_LABEL: &str = "Label";

const ENTITIES: [(&str, char); 5] = [
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&#10;", '\n'),
    ("&#13;", '\r'),
];

/// An external account authorized to read a bulletin's private data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReaderKey {
    /// Account id of the reader
    pub public_key: String,
    /// Free-form label shown to the author
    pub label: String,
}

impl ReaderKey {
    pub fn new(public_key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            label: label.into(),
        }
    }
}

/// Metadata packet of one bulletin revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPacket {
    uid: UniversalId,
    status: RevisionStatus,
    last_saved_time: i64,
    all_private: bool,
    all_readers_proxy_upload: bool,
    field_data_id: String,
    field_data_signature: Option<PacketSignature>,
    private_field_data_id: String,
    private_field_data_signature: Option<PacketSignature>,
    public_attachment_ids: Vec<String>,
    private_attachment_ids: Vec<String>,
    history: Vec<String>,
    authorized_readers: BTreeSet<ReaderKey>,
}

impl HeaderPacket {
    /// Empty draft header for `uid`
    pub fn new(uid: UniversalId) -> Self {
        Self {
            uid,
            status: RevisionStatus::Draft,
            last_saved_time: 0,
            all_private: false,
            all_readers_proxy_upload: false,
            field_data_id: String::new(),
            field_data_signature: None,
            private_field_data_id: String::new(),
            private_field_data_signature: None,
            public_attachment_ids: Vec::new(),
            private_attachment_ids: Vec::new(),
            history: Vec::new(),
            authorized_readers: BTreeSet::new(),
        }
    }

    pub fn uid(&self) -> &UniversalId {
        &self.uid
    }

    pub fn local_id(&self) -> &str {
        self.uid.local_id()
    }

    pub fn account_id(&self) -> &str {
        self.uid.account_id()
    }

    pub fn status(&self) -> RevisionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RevisionStatus) {
        self.status = status;
    }

    pub fn is_draft(&self) -> bool {
        self.status == RevisionStatus::Draft
    }

    /// Milliseconds since the Unix epoch of the last save
    pub fn last_saved_time(&self) -> i64 {
        self.last_saved_time
    }

    pub fn set_last_saved_time(&mut self, millis: i64) {
        self.last_saved_time = millis;
    }

    /// Refresh `last_saved_time`, never moving it backwards.
    pub fn touch_last_saved_time(&mut self) {
        let now = Utc::now().timestamp_millis();
        self.last_saved_time = now.max(self.last_saved_time.saturating_add(1));
    }

    pub fn is_all_private(&self) -> bool {
        self.all_private
    }

    pub fn set_all_private(&mut self, all_private: bool) {
        self.all_private = all_private;
    }

    /// Whether every authorized reader may upload this bulletin on the
    /// author's behalf
    pub fn all_readers_proxy_upload(&self) -> bool {
        self.all_readers_proxy_upload
    }

    pub fn set_all_readers_proxy_upload(&mut self, allowed: bool) {
        self.all_readers_proxy_upload = allowed;
    }

    pub fn field_data_id(&self) -> &str {
        &self.field_data_id
    }

    pub fn set_field_data_id(&mut self, local_id: impl Into<String>) {
        self.field_data_id = local_id.into();
    }

    pub fn field_data_signature(&self) -> Option<&PacketSignature> {
        self.field_data_signature.as_ref()
    }

    pub fn set_field_data_signature(&mut self, signature: Option<PacketSignature>) {
        self.field_data_signature = signature;
    }

    pub fn private_field_data_id(&self) -> &str {
        &self.private_field_data_id
    }

    pub fn set_private_field_data_id(&mut self, local_id: impl Into<String>) {
        self.private_field_data_id = local_id.into();
    }

    pub fn private_field_data_signature(&self) -> Option<&PacketSignature> {
        self.private_field_data_signature.as_ref()
    }

    pub fn set_private_field_data_signature(&mut self, signature: Option<PacketSignature>) {
        self.private_field_data_signature = signature;
    }

    pub fn public_attachment_ids(&self) -> &[String] {
        &self.public_attachment_ids
    }

    pub fn set_public_attachment_ids(&mut self, ids: Vec<String>) {
        self.public_attachment_ids = ids;
    }

    pub fn add_public_attachment_id(&mut self, local_id: impl Into<String>) {
        self.public_attachment_ids.push(local_id.into());
    }

    pub fn private_attachment_ids(&self) -> &[String] {
        &self.private_attachment_ids
    }

    pub fn set_private_attachment_ids(&mut self, ids: Vec<String>) {
        self.private_attachment_ids = ids;
    }

    pub fn add_private_attachment_id(&mut self, local_id: impl Into<String>) {
        self.private_attachment_ids.push(local_id.into());
    }

    /// Ancestor local ids, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Replace the ancestry history.
    ///
    /// Fails with `InvalidPacket` if the history names this header itself.
    pub fn set_history(&mut self, history: Vec<String>) -> StoreResult<()> {
        check_history(self.uid.local_id(), &history)?;
        self.history = history;
        Ok(())
    }

    /// Local id of the direct predecessor, if any
    pub fn parent_local_id(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    pub fn authorized_readers(&self) -> &BTreeSet<ReaderKey> {
        &self.authorized_readers
    }

    pub fn add_authorized_reader(&mut self, reader: ReaderKey) {
        self.authorized_readers.insert(reader);
    }

    pub fn set_authorized_readers(&mut self, readers: BTreeSet<ReaderKey>) {
        self.authorized_readers = readers;
    }

    /// Whether `account_id` is among the authorized readers
    pub fn authorizes_reader(&self, account_id: &str) -> bool {
        self.authorized_readers
            .iter()
            .any(|reader| reader.public_key == account_id)
    }

    /// Every non-header packet this header references, data packets first
    pub fn referenced_local_ids(&self) -> Vec<String> {
        [&self.field_data_id, &self.private_field_data_id]
            .into_iter()
            .filter(|id| !id.is_empty())
            .cloned()
            .chain(self.public_attachment_ids.iter().cloned())
            .chain(self.private_attachment_ids.iter().cloned())
            .collect()
    }

    /// Serialize to the tagged text form
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        open_block(&mut out, ROOT_TAG);
        write_leaf(&mut out, TAG_LOCAL_ID, self.uid.local_id());
        if let Some(status) = self.status.header_text() {
            write_leaf(&mut out, TAG_STATUS, status);
        }
        write_leaf(&mut out, TAG_LAST_SAVED, &self.last_saved_time.to_string());
        write_leaf(&mut out, TAG_ALL_PRIVATE, flag_text(self.all_private));
        write_leaf(
            &mut out,
            TAG_PROXY_UPLOAD,
            flag_text(self.all_readers_proxy_upload),
        );
        write_leaf(&mut out, TAG_DATA_ID, &self.field_data_id);
        if let Some(sig) = &self.field_data_signature {
            write_leaf(&mut out, TAG_DATA_SIG, &sig.to_base64());
        }
        write_leaf(&mut out, TAG_PRIVATE_DATA_ID, &self.private_field_data_id);
        if let Some(sig) = &self.private_field_data_signature {
            write_leaf(&mut out, TAG_PRIVATE_DATA_SIG, &sig.to_base64());
        }

        write_list(
            &mut out,
            TAG_PUBLIC_ATTACHMENTS,
            TAG_ATTACHMENT,
            &self.public_attachment_ids,
        );
        write_list(
            &mut out,
            TAG_PRIVATE_ATTACHMENTS,
            TAG_ATTACHMENT,
            &self.private_attachment_ids,
        );
        write_list(&mut out, TAG_HISTORY, TAG_ANCESTOR, &self.history);

        open_block(&mut out, TAG_READERS);
        for reader in &self.authorized_readers {
            write_leaf(&mut out, TAG_READER_KEY, &reader.public_key);
            if !reader.label.is_empty() {
                write_leaf(&mut out, TAG_READER_LABEL, &reader.label);
            }
        }
        close_block(&mut out, TAG_READERS);

        close_block(&mut out, ROOT_TAG);
        out
    }

    /// Parse a header record body, requiring the text to name the same
    /// local id the record was signed under.
    pub fn from_record(record: &PacketRecord) -> StoreResult<Self> {
        record.expect_kind(PacketKind::Header)?;
        let text = std::str::from_utf8(&record.body)
            .map_err(|e| invalid(format!("body is not UTF-8: {}", e)))?;
        let header = Self::from_text(&record.account_id, text)?;
        if header.local_id() != record.local_id {
            return Err(invalid(format!(
                "text names {} but record is {}",
                header.local_id(),
                record.local_id
            )));
        }
        Ok(header)
    }

    /// Parse the tagged text form for a header authored by `account_id`
    pub fn from_text(account_id: &str, text: &str) -> StoreResult<Self> {
        let mut header = HeaderPacket::new(UniversalId::new(account_id, ""));
        header.status = RevisionStatus::Legacy;
        let mut readers: Vec<ReaderKey> = Vec::new();
        let mut stack: Vec<Block> = Vec::new();
        let mut finished = false;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if finished {
                return Err(invalid("content after end of header"));
            }
            match Line::parse(line)? {
                Line::Open(tag) => {
                    let block = match stack.last() {
                        None if tag == ROOT_TAG => Block::Packet,
                        None => return Err(invalid(format!("expected <{}>", ROOT_TAG))),
                        Some(Block::Packet) => Block::named(tag),
                        Some(_) => Block::Ignored(tag.to_string()),
                    };
                    stack.push(block);
                }
                Line::Close(tag) => {
                    let block = stack
                        .pop()
                        .ok_or_else(|| invalid(format!("unexpected </{}>", tag)))?;
                    if block.tag() != tag {
                        return Err(invalid(format!(
                            "</{}> closes <{}>",
                            tag,
                            block.tag()
                        )));
                    }
                    finished = stack.is_empty();
                }
                Line::Leaf(tag, raw) => {
                    let value = unescape(raw)?;
                    match stack.last() {
                        None => return Err(invalid(format!("<{}> outside header", tag))),
                        Some(Block::Packet) => header.apply_field(tag, value, &mut readers)?,
                        Some(Block::History) if tag == TAG_ANCESTOR => header.history.push(value),
                        Some(Block::PublicAttachments) if tag == TAG_ATTACHMENT => {
                            header.public_attachment_ids.push(value)
                        }
                        Some(Block::PrivateAttachments) if tag == TAG_ATTACHMENT => {
                            header.private_attachment_ids.push(value)
                        }
                        Some(Block::Readers) if tag == TAG_READER_KEY => {
                            readers.push(ReaderKey::new(value, ""))
                        }
                        Some(Block::Readers) if tag == TAG_READER_LABEL => {
                            if let Some(last) = readers.last_mut() {
                                last.label = value;
                            }
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        if !finished {
            return Err(invalid("unterminated header"));
        }
        if header.uid.local_id().is_empty() {
            return Err(invalid("missing BulletinLocalId"));
        }
        check_history(header.uid.local_id(), &header.history)?;
        header.authorized_readers = readers.into_iter().collect();
        Ok(header)
    }

    fn apply_field(
        &mut self,
        tag: &str,
        value: String,
        readers: &mut Vec<ReaderKey>,
    ) -> StoreResult<()> {
        match tag {
            TAG_LOCAL_ID => self.uid = self.uid.sibling(value),
            TAG_STATUS => self.status = RevisionStatus::from_header_text(&value),
            TAG_LAST_SAVED => {
                self.last_saved_time = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad LastSavedTime: {}", value)))?
            }
            TAG_ALL_PRIVATE => self.all_private = parse_flag(&value),
            TAG_PROXY_UPLOAD => self.all_readers_proxy_upload = parse_flag(&value),
            TAG_DATA_ID => self.field_data_id = value,
            TAG_DATA_SIG => self.field_data_signature = parse_signature(&value)?,
            TAG_PRIVATE_DATA_ID => self.private_field_data_id = value,
            TAG_PRIVATE_DATA_SIG => self.private_field_data_signature = parse_signature(&value)?,
            TAG_LEGACY_READER if !value.is_empty() => readers.push(ReaderKey::new(value, "")),
            _ => {}
        }
        Ok(())
    }
}

/// Block currently being parsed
enum Block {
    Packet,
    History,
    PublicAttachments,
    PrivateAttachments,
    Readers,
    Ignored(String),
}

impl Block {
    fn named(tag: &str) -> Self {
        match tag {
            TAG_HISTORY => Block::History,
            TAG_PUBLIC_ATTACHMENTS => Block::PublicAttachments,
            TAG_PRIVATE_ATTACHMENTS => Block::PrivateAttachments,
            TAG_READERS => Block::Readers,
            other => Block::Ignored(other.to_string()),
        }
    }

    fn tag(&self) -> &str {
        match self {
            Block::Packet => ROOT_TAG,
            Block::History => TAG_HISTORY,
            Block::PublicAttachments => TAG_PUBLIC_ATTACHMENTS,
            Block::PrivateAttachments => TAG_PRIVATE_ATTACHMENTS,
            Block::Readers => TAG_READERS,
            Block::Ignored(tag) => tag,
        }
    }
}

/// One line of header text
enum Line<'a> {
    Open(&'a str),
    Close(&'a str),
    Leaf(&'a str, &'a str),
}

impl<'a> Line<'a> {
    fn parse(line: &'a str) -> StoreResult<Self> {
        let malformed = || invalid(format!("malformed line: {}", line));
        let inner = line.strip_prefix('<').ok_or_else(malformed)?;

        if let Some(rest) = inner.strip_prefix('/') {
            let tag = rest
                .strip_suffix('>')
                .filter(|t| is_tag_name(t))
                .ok_or_else(malformed)?;
            return Ok(Line::Close(tag));
        }

        let end = inner.find('>').ok_or_else(malformed)?;
        let tag = &inner[..end];
        if !is_tag_name(tag) {
            return Err(malformed());
        }
        let rest = &inner[end + 1..];
        if rest.is_empty() {
            return Ok(Line::Open(tag));
        }
        let value = rest
            .strip_suffix('>')
            .and_then(|r| r.strip_suffix(tag))
            .and_then(|r| r.strip_suffix("</"))
            .ok_or_else(malformed)?;
        Ok(Line::Leaf(tag, value))
    }
}

/// XML name restricted to ASCII: a letter or `_`, then letters, digits,
/// `_`, `-`, `.` or `:`
fn is_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn check_history(own_local_id: &str, history: &[String]) -> StoreResult<()> {
    if history.iter().any(|id| id == own_local_id) {
        return Err(invalid(format!(
            "history of {} contains itself",
            own_local_id
        )));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidPacket(format!("Header: {}", msg.into()))
}

fn flag_text(flag: bool) -> &'static str {
    if flag {
        "1"
    } else {
        "0"
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_signature(value: &str) -> StoreResult<Option<PacketSignature>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    PacketSignature::from_base64(value).map(Some)
}

fn open_block(out: &mut String, tag: &str) {
    out.push('<');
    out.push_str(tag);
    out.push_str(">\n");
}

fn close_block(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn write_leaf(out: &mut String, tag: &str, value: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    escape_into(out, value);
    close_block(out, tag);
}

fn write_list(out: &mut String, block: &str, item: &str, values: &[String]) {
    open_block(out, block);
    for value in values {
        write_leaf(out, item, value);
    }
    close_block(out, block);
}

fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match ENTITIES.iter().find(|(_, ch)| *ch == c) {
            Some((entity, _)) => out.push_str(entity),
            None => out.push(c),
        }
    }
}

fn unescape(value: &str) -> StoreResult<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let (entity, c) = ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
            .ok_or_else(|| invalid(format!("unknown entity in {}", value)))?;
        out.push(*c);
        rest = &rest[entity.len()..];
    }
    out.push_str(rest);
    Ok(out)
}
