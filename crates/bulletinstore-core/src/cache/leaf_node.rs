//! Leaf/ancestor classification of stored revisions
//!
//! A stored revision is a leaf unless some other stored header of the same
//! account names it in its history. The classification is rebuilt from a
//! full database scan whenever a query finds it stale; every notification
//! marks it stale.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::StoreCache;
use crate::crypto::SecurityProvider;
use crate::database::PacketDatabase;
use crate::error::{StoreError, StoreResult};
use crate::packet::{unframe_stored, DatabaseKey, HeaderPacket, PacketKind, PacketRecord, UniversalId};

/// One full classification pass
#[derive(Debug, Default)]
struct LeafSnapshot {
    /// Every readable header, by uid
    headers: BTreeMap<UniversalId, BTreeSet<DatabaseKey>>,
    /// Uids named in some header's history
    non_leaf: BTreeSet<UniversalId>,
    /// Accounts each header authorizes to read it
    readers: BTreeMap<UniversalId, BTreeSet<String>>,
    /// Whether any header could not be read
    had_errors: bool,
}

#[derive(Default)]
struct LeafState {
    snapshot: Option<Arc<LeafSnapshot>>,
}

/// Invalidate-on-write projection of which revisions are current.
pub struct LeafNodeCache {
    database: Arc<dyn PacketDatabase>,
    security: Arc<dyn SecurityProvider>,
    state: Mutex<LeafState>,
}

impl LeafNodeCache {
    pub fn new(database: Arc<dyn PacketDatabase>, security: Arc<dyn SecurityProvider>) -> Self {
        Self {
            database,
            security,
            state: Mutex::new(LeafState::default()),
        }
    }

    /// Uids of every current revision
    pub fn leaf_uids(&self) -> StoreResult<Vec<UniversalId>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .headers
            .keys()
            .filter(|uid| !snapshot.non_leaf.contains(*uid))
            .cloned()
            .collect())
    }

    /// Header keys of every current revision
    pub fn leaf_keys(&self) -> StoreResult<Vec<DatabaseKey>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .headers
            .iter()
            .filter(|(uid, _)| !snapshot.non_leaf.contains(*uid))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect())
    }

    /// Uids of stored revisions superseded by a newer one
    pub fn non_leaf_uids(&self) -> StoreResult<Vec<UniversalId>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot
            .headers
            .keys()
            .filter(|uid| snapshot.non_leaf.contains(*uid))
            .cloned()
            .collect())
    }

    /// Header keys of every readable stored revision
    pub fn all_header_keys(&self) -> StoreResult<Vec<DatabaseKey>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.headers.values().flatten().cloned().collect())
    }

    /// Distinct authors of current revisions that authorize `reader_account_id`
    pub fn field_offices(&self, reader_account_id: &str) -> StoreResult<Vec<String>> {
        let snapshot = self.snapshot()?;
        let offices: BTreeSet<String> = snapshot
            .readers
            .iter()
            .filter(|(uid, readers)| {
                !snapshot.non_leaf.contains(*uid) && readers.contains(reader_account_id)
            })
            .map(|(uid, _)| uid.account_id().to_string())
            .collect();
        Ok(offices.into_iter().collect())
    }

    /// Whether `uid` is stored and not superseded
    pub fn is_leaf(&self, uid: &UniversalId) -> StoreResult<bool> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.headers.contains_key(uid) && !snapshot.non_leaf.contains(uid))
    }

    /// Whether some stored revision names `uid` as an ancestor
    pub fn has_newer_revision(&self, uid: &UniversalId) -> StoreResult<bool> {
        Ok(self.snapshot()?.non_leaf.contains(uid))
    }

    /// Whether the last scan skipped unreadable headers
    pub fn had_errors(&self) -> StoreResult<bool> {
        Ok(self.snapshot()?.had_errors)
    }

    fn invalidate(&self) {
        self.state.lock().snapshot = None;
    }

    /// Current classification, rescanning if stale.
    ///
    /// The scan runs under the state lock, so an invalidation waits for an
    /// in-flight scan and is never lost.
    fn snapshot(&self) -> StoreResult<Arc<LeafSnapshot>> {
        let mut state = self.state.lock();
        if let Some(snapshot) = &state.snapshot {
            return Ok(snapshot.clone());
        }
        let snapshot = Arc::new(self.scan()?);
        state.snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn scan(&self) -> StoreResult<LeafSnapshot> {
        let mut snapshot = LeafSnapshot::default();
        let security = self.security.as_ref();

        self.database.visit_all_records(&mut |key, stored| {
            if !PacketKind::is_header_local_id(key.local_id()) {
                return;
            }
            match read_header(key, stored, security) {
                Ok(header) => {
                    for ancestor in header.history() {
                        snapshot.non_leaf.insert(key.uid().sibling(ancestor.as_str()));
                    }
                    snapshot.readers.entry(key.uid().clone()).or_default().extend(
                        header
                            .authorized_readers()
                            .iter()
                            .map(|reader| reader.public_key.clone()),
                    );
                    snapshot
                        .headers
                        .entry(key.uid().clone())
                        .or_default()
                        .insert(key.clone());
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Unreadable header during leaf scan");
                    snapshot.had_errors = true;
                }
            }
        })?;

        debug!(
            headers = snapshot.headers.len(),
            non_leaf = snapshot.non_leaf.len(),
            had_errors = snapshot.had_errors,
            "Rebuilt leaf node cache"
        );
        Ok(snapshot)
    }
}

/// Decode and verify a stored header found during the scan.
fn read_header(
    key: &DatabaseKey,
    stored: &[u8],
    security: &dyn SecurityProvider,
) -> StoreResult<HeaderPacket> {
    let record = PacketRecord::decode(&unframe_stored(stored, security)?)?;
    if record.local_id != key.local_id() {
        return Err(StoreError::InvalidPacket(format!(
            "{} stored under {}",
            record.local_id, key
        )));
    }
    record.verify_author(key.account_id(), security)?;
    HeaderPacket::from_record(&record)
}

impl StoreCache for LeafNodeCache {
    fn revision_was_saved(&self, _uid: &UniversalId) {
        self.invalidate();
    }

    fn revision_was_removed(&self, _uid: &UniversalId) {
        self.invalidate();
    }

    fn store_was_cleared(&self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountSecurity;
    use crate::database::MemoryDatabase;
    use crate::packet::{frame_stored, ReaderKey};

    struct Fixture {
        db: Arc<MemoryDatabase>,
        security: Arc<AccountSecurity>,
        cache: LeafNodeCache,
    }

    fn create_fixture() -> Fixture {
        let db = Arc::new(MemoryDatabase::default());
        let security = Arc::new(AccountSecurity::generate().unwrap());
        let cache = LeafNodeCache::new(db.clone(), security.clone());
        Fixture { db, security, cache }
    }

    impl Fixture {
        fn account(&self) -> String {
            self.security.account_id().unwrap()
        }

        fn store_header(&self, local_id: &str, history: &[&str]) -> UniversalId {
            self.store_header_for(local_id, history, &[])
        }

        fn store_header_for(&self, local_id: &str, history: &[&str], readers: &[&str]) -> UniversalId {
            let uid = UniversalId::new(self.account(), local_id);
            let mut header = HeaderPacket::new(uid.clone());
            for reader in readers {
                header.add_authorized_reader(ReaderKey::new(*reader, ""));
            }
            header
                .set_history(history.iter().map(|s| s.to_string()).collect())
                .unwrap();
            let record = PacketRecord::create(
                PacketKind::Header,
                &uid,
                header.to_text().into_bytes(),
                self.security.as_ref(),
            )
            .unwrap();
            let stored =
                frame_stored(&record.encode().unwrap(), false, self.security.as_ref()).unwrap();
            self.db
                .write_record(&DatabaseKey::sealed(uid.clone()), &stored)
                .unwrap();
            uid
        }
    }

    #[test]
    fn test_empty_database_has_no_leaves() {
        let f = create_fixture();
        assert!(f.cache.leaf_uids().unwrap().is_empty());
        assert!(!f.cache.had_errors().unwrap());
    }

    #[test]
    fn test_chain_classification() {
        let f = create_fixture();
        let a = f.store_header("B-a", &[]);
        let b = f.store_header("B-b", &["B-a"]);
        let c = f.store_header("B-c", &["B-a", "B-b"]);
        let other = f.store_header("B-x", &[]);

        let leaves = f.cache.leaf_uids().unwrap();
        assert_eq!(leaves.len(), 2);
        assert!(leaves.contains(&c));
        assert!(leaves.contains(&other));

        let non_leaf = f.cache.non_leaf_uids().unwrap();
        assert!(non_leaf.contains(&a));
        assert!(non_leaf.contains(&b));
        assert!(f.cache.has_newer_revision(&a).unwrap());
        assert!(!f.cache.has_newer_revision(&c).unwrap());
        assert!(f.cache.is_leaf(&c).unwrap());
        assert!(!f.cache.is_leaf(&b).unwrap());
        assert_eq!(f.cache.all_header_keys().unwrap().len(), 4);
    }

    #[test]
    fn test_stale_until_notified() {
        let f = create_fixture();
        f.store_header("B-a", &[]);
        assert_eq!(f.cache.leaf_uids().unwrap().len(), 1);

        let b = f.store_header("B-b", &["B-a"]);
        // Not notified yet: still the old scan
        assert!(f.cache.is_leaf(&b).is_ok_and(|leaf| !leaf));

        f.cache.revision_was_saved(&b);
        assert_eq!(f.cache.leaf_uids().unwrap(), vec![b]);
    }

    #[test]
    fn test_bad_header_recorded_not_thrown() {
        let f = create_fixture();
        let good = f.store_header("B-good", &[]);
        let bad = DatabaseKey::sealed(UniversalId::new(f.account(), "B-bad"));
        f.db.write_record(&bad, &[0, 0xFF, 0xFF]).unwrap();

        assert_eq!(f.cache.leaf_uids().unwrap(), vec![good]);
        assert!(f.cache.had_errors().unwrap());
    }

    #[test]
    fn test_forged_header_recorded_as_error() {
        let f = create_fixture();
        let uid = f.store_header("B-a", &[]);
        let key = DatabaseKey::sealed(uid);

        // Same bytes filed under another account
        let stored = f.db.read_record(&key).unwrap();
        let forged = DatabaseKey::sealed(UniversalId::new("someone-else", "B-a"));
        f.db.write_record(&forged, &stored).unwrap();

        assert_eq!(f.cache.leaf_keys().unwrap(), vec![key]);
        assert!(f.cache.had_errors().unwrap());
    }

    #[test]
    fn test_field_offices_only_count_leaves() {
        let f = create_fixture();
        f.store_header_for("B-a", &[], &["hq-1"]);
        f.store_header_for("B-b", &["B-a"], &["hq-2"]);

        assert!(f.cache.field_offices("hq-1").unwrap().is_empty());
        assert_eq!(f.cache.field_offices("hq-2").unwrap(), vec![f.account()]);
        assert!(f.cache.field_offices("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_hidden_revisions_are_not_leaves() {
        let f = create_fixture();
        let a = f.store_header("B-a", &[]);
        let b = f.store_header("B-b", &[]);
        f.db.hide(&a).unwrap();
        f.cache.revision_was_removed(&a);

        assert_eq!(f.cache.leaf_uids().unwrap(), vec![b]);
    }
}
