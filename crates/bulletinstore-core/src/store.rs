//! Bulletin store: the orchestrator over packets, database, crypto and caches
//!
//! ## Save
//!
//! ```text
//! save(bulletin)
//!   ├── prior header at the same key (best effort, for attachment GC)
//!   ├── public data ──┐
//!   ├── private data ─┼── sign → (encrypt at rest) → write
//!   ├── attachments ──┘
//!   ├── header (last, carrying the data signatures from this save)
//!   ├── notify caches
//!   └── discard attachments dropped since the prior header
//! ```
//!
//! ## Concurrency
//!
//! Cascade deletes hold the store's write lock; leaf queries hold its read
//! lock, so a leaf scan never sees half of a cascade. Saves and loads of
//! different bulletins run without it.
//!
//! Caches are notified as soon as a header is written or discarded, before
//! any later step can fail, so a partial failure never leaves the leaf
//! cache naming keys that are gone.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::archive::{write_packet_zip, PacketZip};
use crate::bulletin::Bulletin;
use crate::cache::{CacheManager, LeafNodeCache, StoreCache};
use crate::config::StoreConfig;
use crate::crypto::SecurityProvider;
use crate::database::{PacketDatabase, RedbDatabase};
use crate::error::{StoreError, StoreResult};
use crate::identity::PacketSignature;
use crate::logging::{hide_notice, NoticeLogger, TracingNoticeLogger};
use crate::packet::{
    frame_stored, unframe_stored, AttachmentPacket, DatabaseKey, FieldDataPacket, HeaderPacket,
    PacketKind, PacketRecord, UniversalId,
};

/// Signed, selectively encrypted bulletin storage.
pub struct BulletinStore {
    database: Arc<dyn PacketDatabase>,
    security: Arc<dyn SecurityProvider>,
    cache_manager: CacheManager,
    notice_logger: Arc<dyn NoticeLogger>,
    staging_dir: PathBuf,
    cascade_lock: RwLock<()>,
}

impl BulletinStore {
    /// Create a store over an existing database.
    ///
    /// The leaf cache is registered with the cache manager here, before any
    /// other cache can be added.
    pub fn new(database: Arc<dyn PacketDatabase>, security: Arc<dyn SecurityProvider>) -> Self {
        let leaf_node_cache = Arc::new(LeafNodeCache::new(database.clone(), security.clone()));
        Self {
            database,
            security,
            cache_manager: CacheManager::new(leaf_node_cache),
            notice_logger: Arc::new(TracingNoticeLogger),
            staging_dir: std::env::temp_dir(),
            cascade_lock: RwLock::new(()),
        }
    }

    /// Open the redb-backed store described by `config`.
    pub fn open(config: &StoreConfig, security: Arc<dyn SecurityProvider>) -> StoreResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let database = RedbDatabase::new(config.database_path(), config.must_encrypt_local_data)?;
        info!(
            path = %config.database_path().display(),
            must_encrypt_local_data = config.must_encrypt_local_data,
            "Opened bulletin store"
        );
        Ok(Self::new(Arc::new(database), security).with_staging_dir(config.staging_dir()))
    }

    /// Send hide notices to `logger` instead of `tracing`
    pub fn with_notice_logger(mut self, logger: Arc<dyn NoticeLogger>) -> Self {
        self.notice_logger = logger;
        self
    }

    /// Stage imports under `dir`
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Register a cache to be notified after the leaf cache.
    ///
    /// Notifications from a cascade delete or [`Self::delete_all_bulletins`]
    /// arrive while the store's cascade lock is held for writing, and that
    /// lock is not reentrant. A cache must not call the store's leaf queries
    /// from a notification; it reads [`CacheManager::leaf_node_cache`]
    /// directly instead.
    pub fn add_cache(&self, cache: Arc<dyn StoreCache>) {
        self.cache_manager.add_cache(cache);
    }

    pub fn database(&self) -> &Arc<dyn PacketDatabase> {
        &self.database
    }

    pub fn security(&self) -> &Arc<dyn SecurityProvider> {
        &self.security
    }

    pub fn cache_manager(&self) -> &CacheManager {
        &self.cache_manager
    }

    /// Account id of the signing identity
    pub fn account_id(&self) -> StoreResult<String> {
        self.security.account_id()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Save
    // ═══════════════════════════════════════════════════════════════════════

    /// Sign and store every packet of `bulletin`, header last.
    ///
    /// The public data is marked encrypted when the bulletin is a draft or
    /// all-private. `force_encrypt_public_data` (or a database that must
    /// encrypt local data) encrypts every packet at rest, header included. On
    /// success the header carries this save's data signatures and pending
    /// attachments are cleared.
    pub fn save(&self, bulletin: &mut Bulletin, force_encrypt_public_data: bool) -> StoreResult<()> {
        let signer = self.security.account_id()?;
        if bulletin.account_id() != signer {
            return Err(StoreError::WrongAccount {
                expected: signer,
                actual: bulletin.account_id().to_string(),
            });
        }

        let key = bulletin.database_key();
        let prior_header = self.prior_header(&key);

        let encrypt_public = bulletin.is_draft() || bulletin.is_all_private();
        let encrypt_at_rest = force_encrypt_public_data || self.database.must_encrypt_local_data();

        let (header, public_data, private_data) = bulletin.field_data_mut();
        public_data.set_encrypted(encrypt_public);
        private_data.set_encrypted(true);

        let public_sig =
            self.write_field_data(&key, PacketKind::PublicData, public_data, encrypt_at_rest)?;
        let private_sig =
            self.write_field_data(&key, PacketKind::PrivateData, private_data, encrypt_at_rest)?;
        header.set_field_data_signature(Some(public_sig));
        header.set_private_field_data_signature(Some(private_sig));

        let private_ids: BTreeSet<String> =
            bulletin.header().private_attachment_ids().iter().cloned().collect();
        for attachment in bulletin.pending_attachments_mut() {
            let private = private_ids.contains(attachment.local_id());
            attachment.set_encrypted(private || encrypt_public);
            let record = PacketRecord::create(
                PacketKind::Attachment,
                attachment.uid(),
                attachment.encode(self.security.as_ref())?,
                self.security.as_ref(),
            )?;
            self.write_packet(&key.sibling(attachment.local_id()), &record, encrypt_at_rest)?;
        }

        let header = bulletin.header_mut();
        header.touch_last_saved_time();
        let record = PacketRecord::create(
            PacketKind::Header,
            header.uid(),
            header.to_text().into_bytes(),
            self.security.as_ref(),
        )?;
        self.write_packet(&key, &record, encrypt_at_rest)?;
        self.cache_manager.revision_was_saved(bulletin.uid());

        if let Some(prior) = prior_header {
            self.discard_removed_attachments(&key, &prior, bulletin.header())?;
        }
        bulletin.clear_pending_attachments();
        info!(uid = %bulletin.uid(), status = ?key.status(), "Saved bulletin");
        Ok(())
    }

    /// Header already stored at `key`, if one can be read.
    ///
    /// Only attachment cleanup depends on it, so failures are logged and
    /// treated as "no prior revision".
    fn prior_header(&self, key: &DatabaseKey) -> Option<HeaderPacket> {
        match self.database.exists(key) {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Could not check for prior revision");
                return None;
            }
        }
        match self.load_header(key) {
            Ok(header) => Some(header),
            Err(e) => {
                warn!(key = %key, error = %e, "Could not load prior header, skipping attachment cleanup");
                None
            }
        }
    }

    fn write_field_data(
        &self,
        key: &DatabaseKey,
        kind: PacketKind,
        packet: &FieldDataPacket,
        encrypt_at_rest: bool,
    ) -> StoreResult<PacketSignature> {
        let record = PacketRecord::create(
            kind,
            packet.uid(),
            packet.encode(self.security.as_ref())?,
            self.security.as_ref(),
        )?;
        self.write_packet(&key.sibling(packet.local_id()), &record, encrypt_at_rest)?;
        Ok(record.signature)
    }

    fn discard_removed_attachments(
        &self,
        key: &DatabaseKey,
        prior: &HeaderPacket,
        current: &HeaderPacket,
    ) -> StoreResult<()> {
        let lists = [
            (prior.public_attachment_ids(), current.public_attachment_ids()),
            (prior.private_attachment_ids(), current.private_attachment_ids()),
        ];
        for (old_ids, new_ids) in lists {
            for id in old_ids.iter().filter(|id| !new_ids.contains(id)) {
                debug!(local_id = %id, "Discarding removed attachment");
                self.database.discard(&key.sibling(id.as_str()))?;
            }
        }
        Ok(())
    }

    fn write_packet(&self, key: &DatabaseKey, record: &PacketRecord, encrypt: bool) -> StoreResult<()> {
        let stored = frame_stored(&record.encode()?, encrypt, self.security.as_ref())?;
        self.database.write_record(key, &stored)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Load
    // ═══════════════════════════════════════════════════════════════════════

    /// Read, decode and verify the record at `key`.
    fn read_packet(&self, key: &DatabaseKey, kind: PacketKind) -> StoreResult<PacketRecord> {
        let stored = self.database.read_record(key)?;
        let record = PacketRecord::decode(&unframe_stored(&stored, self.security.as_ref())?)?;
        record.expect_kind(kind)?;
        if record.local_id != key.local_id() {
            return Err(StoreError::InvalidPacket(format!(
                "{} stored under {}",
                record.local_id, key
            )));
        }
        record.verify_author(key.account_id(), self.security.as_ref())?;
        Ok(record)
    }

    /// Load and verify the header at `key`.
    pub fn load_header(&self, key: &DatabaseKey) -> StoreResult<HeaderPacket> {
        let record = self.read_packet(key, PacketKind::Header)?;
        HeaderPacket::from_record(&record)
    }

    /// Load a revision: header plus both field-data packets, each verified.
    ///
    /// The data records' signatures must also match the ones the header
    /// recorded, so data from another save cannot be swapped in.
    pub fn load_bulletin(&self, key: &DatabaseKey) -> StoreResult<Bulletin> {
        let header = self.load_header(key)?;
        let public_data = self.load_field_data(
            &key.sibling(header.field_data_id()),
            PacketKind::PublicData,
            header.field_data_signature(),
        )?;
        let private_data = self.load_field_data(
            &key.sibling(header.private_field_data_id()),
            PacketKind::PrivateData,
            header.private_field_data_signature(),
        )?;
        Ok(Bulletin::from_packets(header, public_data, private_data))
    }

    fn load_field_data(
        &self,
        key: &DatabaseKey,
        kind: PacketKind,
        expected_signature: Option<&PacketSignature>,
    ) -> StoreResult<FieldDataPacket> {
        let record = self.read_packet(key, kind)?;
        if let Some(expected) = expected_signature {
            if &record.signature != expected {
                return Err(StoreError::SignatureVerificationFailed(format!(
                    "{} {} does not match its header",
                    kind, record.local_id
                )));
            }
        }
        FieldDataPacket::decode(record.uid(), &record.body, self.security.as_ref())
    }

    /// Load and verify one attachment.
    pub fn load_attachment(&self, key: &DatabaseKey) -> StoreResult<AttachmentPacket> {
        let record = self.read_packet(key, PacketKind::Attachment)?;
        AttachmentPacket::decode(record.uid(), &record.body, self.security.as_ref())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Delete & hide
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete one revision after verifying its header.
    ///
    /// Nothing is deleted unless the header at `key` loads and verifies.
    /// Caches are notified even when discarding fails partway.
    pub fn delete_bulletin_revision(&self, key: &DatabaseKey) -> StoreResult<()> {
        let header = self.load_header(key)?;
        let result = self.delete_revision_from_database(key, &header);
        self.cache_manager.revision_was_removed(key.uid());
        result?;
        info!(key = %key, "Deleted bulletin revision");
        Ok(())
    }

    /// Discard every packet `header` references, then the header at `key`.
    ///
    /// Does not notify caches.
    pub fn delete_revision_from_database(
        &self,
        key: &DatabaseKey,
        header: &HeaderPacket,
    ) -> StoreResult<()> {
        for local_id in header.referenced_local_ids() {
            self.database.discard(&key.sibling(local_id))?;
        }
        self.database.discard(key)
    }

    /// Delete a bulletin and every sealed ancestor named in its history.
    ///
    /// Serialized against other cascades and leaf queries. Any failure is
    /// reported as `DeleteFailed`; the store may then hold part of the chain
    /// and callers should rescan.
    pub fn remove_bulletin_from_store(&self, bulletin: &Bulletin) -> StoreResult<()> {
        let _guard = self.cascade_lock.write();

        let cascade = || -> StoreResult<()> {
            for ancestor in bulletin.history() {
                let key = DatabaseKey::sealed(bulletin.uid().sibling(ancestor.as_str()));
                if self.database.exists(&key)? {
                    self.delete_bulletin_revision(&key)?;
                }
            }
            self.delete_bulletin_revision(&bulletin.database_key())
        };

        cascade().map_err(|e| {
            warn!(uid = %bulletin.uid(), error = %e, "Cascade delete failed");
            StoreError::DeleteFailed(e.to_string())
        })
    }

    /// Tombstone each uid, keeping its bytes, and log a notice per uid.
    pub fn hide_packets(&self, uids: &[UniversalId]) -> StoreResult<()> {
        for uid in uids {
            self.database.hide(uid)?;
            self.cache_manager.revision_was_removed(uid);
            self.notice_logger.log_notice(&hide_notice(uid));
        }
        Ok(())
    }

    /// Remove every record and tombstone from the database.
    pub fn delete_all_bulletins(&self) -> StoreResult<()> {
        let _guard = self.cascade_lock.write();
        let result = self.database.delete_all();
        self.cache_manager.store_was_cleared();
        result?;
        info!("Deleted all bulletins");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Leaf queries
    // ═══════════════════════════════════════════════════════════════════════

    fn leaf_cache(&self) -> &LeafNodeCache {
        self.cache_manager.leaf_node_cache()
    }

    /// Number of current revisions
    pub fn bulletin_count(&self) -> StoreResult<usize> {
        Ok(self.leaf_keys()?.len())
    }

    pub fn leaf_uids(&self) -> StoreResult<Vec<UniversalId>> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().leaf_uids()
    }

    pub fn leaf_keys(&self) -> StoreResult<Vec<DatabaseKey>> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().leaf_keys()
    }

    pub fn non_leaf_uids(&self) -> StoreResult<Vec<UniversalId>> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().non_leaf_uids()
    }

    pub fn is_leaf(&self, uid: &UniversalId) -> StoreResult<bool> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().is_leaf(uid)
    }

    pub fn has_newer_revision(&self, uid: &UniversalId) -> StoreResult<bool> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().has_newer_revision(uid)
    }

    /// Whether the last leaf scan skipped unreadable headers
    pub fn had_errors_while_caching(&self) -> StoreResult<bool> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().had_errors()
    }

    /// Authors whose current revisions authorize `reader_account_id`
    pub fn field_offices(&self, reader_account_id: &str) -> StoreResult<Vec<String>> {
        let _guard = self.cascade_lock.read();
        self.leaf_cache().field_offices(reader_account_id)
    }

    /// Visit the header key of every current revision.
    pub fn visit_all_bulletins(&self, visitor: &mut dyn FnMut(&DatabaseKey)) -> StoreResult<()> {
        for key in self.leaf_keys()? {
            visitor(&key);
        }
        Ok(())
    }

    /// Visit every stored header key, current or not, without reading it.
    pub fn visit_all_bulletin_revisions(
        &self,
        visitor: &mut dyn FnMut(&DatabaseKey),
    ) -> StoreResult<()> {
        let _guard = self.cascade_lock.read();
        self.database.visit_all_records(&mut |key, _| {
            if PacketKind::is_header_local_id(key.local_id()) {
                visitor(key);
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Import & export
    // ═══════════════════════════════════════════════════════════════════════

    /// Write the revision at `key` and every packet it references to a zip.
    ///
    /// Packets leave without at-rest encryption; content-level encryption
    /// and signatures are kept.
    pub fn export_bulletin_zip(&self, key: &DatabaseKey, path: &Path) -> StoreResult<()> {
        let header_record = self.read_packet(key, PacketKind::Header)?;
        let header = HeaderPacket::from_record(&header_record)?;

        let mut records = vec![header_record];
        for (local_id, kind) in referenced_packets(&header) {
            records.push(self.read_packet(&key.sibling(local_id), kind)?);
        }
        write_packet_zip(path, &records)?;

        info!(key = %key, packets = records.len(), path = %path.display(), "Exported bulletin");
        Ok(())
    }

    /// Import a bulletin zip, all or nothing.
    ///
    /// The author is `account_if_known` when given, otherwise the account
    /// the header claims. Every entry in the archive, referenced or not, is
    /// verified against that author before anything is written; entries the
    /// header does not reference are then left out. A draft at the same uid
    /// is discarded. Returns the imported uid.
    pub fn import_bulletin_zip(
        &self,
        path: &Path,
        account_if_known: Option<&str>,
    ) -> StoreResult<UniversalId> {
        let mut zip = PacketZip::open(path)?;

        let header_record = zip.header_record()?;
        let author = account_if_known
            .map(str::to_string)
            .unwrap_or_else(|| header_record.account_id.clone());
        header_record.verify_author(&author, self.security.as_ref())?;
        let header = HeaderPacket::from_record(&header_record)?;

        let mut entries = HashMap::new();
        for local_id in zip.local_ids() {
            if local_id == header_record.local_id {
                continue;
            }
            let record = zip.read_record(&local_id)?;
            record.verify_author(&author, self.security.as_ref())?;
            entries.insert(local_id, record);
        }

        let mut records = Vec::new();
        for (local_id, kind) in referenced_packets(&header) {
            let record = entries.remove(&local_id).ok_or_else(|| {
                StoreError::InvalidPacket(format!("Archive is missing {} {}", kind, local_id))
            })?;
            record.expect_kind(kind)?;
            let recorded = match kind {
                PacketKind::PublicData => header.field_data_signature(),
                PacketKind::PrivateData => header.private_field_data_signature(),
                _ => None,
            };
            if recorded.is_some_and(|sig| sig != &record.signature) {
                return Err(StoreError::SignatureVerificationFailed(format!(
                    "{} {} does not match its header",
                    kind, local_id
                )));
            }
            records.push(record);
        }
        if !entries.is_empty() {
            debug!(skipped = entries.len(), "Leaving out unreferenced archive entries");
        }
        records.push(header_record);

        let uid = header.uid().clone();
        self.delete_draft_packets(&uid)?;

        fs::create_dir_all(&self.staging_dir)?;
        let staging = TempDir::new_in(&self.staging_dir)?;
        let must_encrypt = self.database.must_encrypt_local_data();
        let mut files = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            let encrypt = must_encrypt && record.kind.needs_local_encryption();
            let stored = frame_stored(&record.encode()?, encrypt, self.security.as_ref())?;
            let file = staging.path().join(format!("packet-{}", index));
            fs::write(&file, stored)?;
            files.insert(DatabaseKey::new(record.uid(), header.status()), file);
        }
        self.database.import_files(&files)?;

        self.cache_manager.revision_was_saved(&uid);
        info!(uid = %uid, packets = files.len(), "Imported bulletin");
        Ok(uid)
    }

    /// Import a zip under the uids it carries, trusting its header's author.
    ///
    /// An account mismatch inside the archive is reported as `InvalidPacket`.
    pub fn import_zip_file_with_same_uids(&self, path: &Path) -> StoreResult<UniversalId> {
        self.import_bulletin_zip(path, None).map_err(|e| match e {
            StoreError::WrongAccount { expected, actual } => StoreError::InvalidPacket(format!(
                "Packet from {} in bulletin of {}",
                actual, expected
            )),
            other => other,
        })
    }

    /// Discard the draft revision of `uid`, if any.
    ///
    /// Referenced packets go only if the draft header can be read; the
    /// header key itself is always discarded. Caches are told right away.
    fn delete_draft_packets(&self, uid: &UniversalId) -> StoreResult<()> {
        let key = DatabaseKey::draft(uid.clone());
        if !self.database.exists(&key)? {
            return Ok(());
        }
        let result = match self.load_header(&key) {
            Ok(header) => self.delete_revision_from_database(&key, &header),
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable draft header, discarding header only");
                self.database.discard(&key)
            }
        };
        self.cache_manager.revision_was_removed(uid);
        result?;
        debug!(key = %key, "Discarded draft superseded by import");
        Ok(())
    }
}

/// Non-header packets of a revision with the kind each must have
fn referenced_packets(header: &HeaderPacket) -> Vec<(String, PacketKind)> {
    let mut packets = vec![
        (header.field_data_id().to_string(), PacketKind::PublicData),
        (header.private_field_data_id().to_string(), PacketKind::PrivateData),
    ];
    packets.retain(|(id, _)| !id.is_empty());
    packets.extend(
        header
            .public_attachment_ids()
            .iter()
            .chain(header.private_attachment_ids())
            .map(|id| (id.clone(), PacketKind::Attachment)),
    );
    packets
}

impl std::fmt::Debug for BulletinStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulletinStore")
            .field("staging_dir", &self.staging_dir)
            .field("caches", &self.cache_manager.cache_count())
            .finish_non_exhaustive()
    }
}
