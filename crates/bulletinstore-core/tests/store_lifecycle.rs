//! Store lifecycle integration tests
//!
//! Save, load, revise, delete and hide bulletins through `BulletinStore`
//! backed by a real redb file.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};

use bulletinstore_core::logging::read_notices;
use bulletinstore_core::{
    formatted_public_code, AccountSecurity, Bulletin, BulletinStore, DatabaseKey,
    JsonlNoticeLogger, LeafNodeCache, PacketDatabase, ReaderKey, RedbDatabase, StoreCache,
    StoreConfig, StoreError, UniversalId,
};

/// Helper to open a store in a fresh directory
fn create_test_store() -> (BulletinStore, TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::with_data_dir(temp_dir.path().join("data"));
    let security = Arc::new(AccountSecurity::generate().unwrap());
    let store = BulletinStore::open(&config, security).unwrap();
    (store, temp_dir)
}

/// Save a sealed bulletin and return it
fn save_sealed(store: &BulletinStore, bulletin: &mut Bulletin) {
    bulletin.set_sealed();
    store.save(bulletin, false).unwrap();
}

/// Cache that counts notifications per uid
#[derive(Default)]
struct RecordingCache {
    saved: Mutex<Vec<UniversalId>>,
    removed: Mutex<HashMap<UniversalId, usize>>,
    cleared: Mutex<usize>,
}

impl StoreCache for RecordingCache {
    fn revision_was_saved(&self, uid: &UniversalId) {
        self.saved.lock().push(uid.clone());
    }

    fn revision_was_removed(&self, uid: &UniversalId) {
        *self.removed.lock().entry(uid.clone()).or_default() += 1;
    }

    fn store_was_cleared(&self) {
        *self.cleared.lock() += 1;
    }
}

/// Cache that reads leaf state from inside its removal notification
struct LeafWatchingCache {
    leaves: Arc<LeafNodeCache>,
    seen: Mutex<Vec<usize>>,
}

impl StoreCache for LeafWatchingCache {
    fn revision_was_saved(&self, _uid: &UniversalId) {}

    fn revision_was_removed(&self, _uid: &UniversalId) {
        let count = self.leaves.leaf_uids().unwrap().len();
        self.seen.lock().push(count);
    }

    fn store_was_cleared(&self) {}
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn test_save_load_roundtrip_verifies_and_decrypts() {
    let (store, _temp) = create_test_store();
    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    bulletin.set_public_payload(b"<title>Raid on clinic</title>".to_vec());
    bulletin.set_private_payload(b"<witness>anonymous</witness>".to_vec());
    bulletin.add_public_attachment("photo.jpg", vec![0xFF, 0xD8, 0xFF]);
    let secret = bulletin.add_private_attachment("statement.txt", b"signed statement".to_vec());
    save_sealed(&store, &mut bulletin);

    let key = bulletin.database_key();
    let loaded = store.load_bulletin(&key).unwrap();
    assert_eq!(loaded.public_data().payload(), b"<title>Raid on clinic</title>");
    assert_eq!(loaded.private_data().payload(), b"<witness>anonymous</witness>");
    assert!(loaded.private_data().is_encrypted());
    assert_eq!(loaded.header().public_attachment_ids().len(), 1);
    assert!(loaded.header().field_data_signature().is_some());

    let attachment = store.load_attachment(&key.sibling(secret.local_id())).unwrap();
    assert!(attachment.is_encrypted());
    assert_eq!(attachment.filename(), "statement.txt");
    assert_eq!(attachment.payload(), b"signed statement");
}

#[test]
fn test_must_encrypt_store_roundtrip() {
    let (store, _temp) = create_test_store();
    assert!(store.database().must_encrypt_local_data());

    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    bulletin.set_public_payload(b"public".to_vec());
    save_sealed(&store, &mut bulletin);

    let loaded = store.load_bulletin(&bulletin.database_key()).unwrap();
    assert!(!loaded.public_data().is_encrypted());
    assert_eq!(loaded.public_data().payload(), b"public");
}

#[test]
fn test_pending_attachments_cleared_after_save() {
    let (store, _temp) = create_test_store();
    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    bulletin.add_public_attachment("a.txt", b"a".to_vec());
    bulletin.add_private_attachment("b.txt", b"b".to_vec());
    store.save(&mut bulletin, false).unwrap();

    assert!(bulletin.pending_public_attachments().is_empty());
    assert!(bulletin.pending_private_attachments().is_empty());
    assert_eq!(bulletin.header().public_attachment_ids().len(), 1);
    assert_eq!(bulletin.header().private_attachment_ids().len(), 1);
}

#[test]
fn test_reopen_store_keeps_bulletins() {
    let temp_dir = tempdir().unwrap();
    let config = StoreConfig::with_data_dir(temp_dir.path());
    let security = Arc::new(AccountSecurity::generate().unwrap());

    let key = {
        let store = BulletinStore::open(&config, security.clone()).unwrap();
        let mut bulletin = Bulletin::new(&store.account_id().unwrap());
        bulletin.set_public_payload(b"persisted".to_vec());
        save_sealed(&store, &mut bulletin);
        bulletin.database_key()
    };

    let store = BulletinStore::open(&config, security).unwrap();
    assert_eq!(store.leaf_keys().unwrap(), vec![key.clone()]);
    assert_eq!(
        store.load_bulletin(&key).unwrap().public_data().payload(),
        b"persisted"
    );
}

// ============================================================================
// Revisions and Leaves
// ============================================================================

#[test]
fn test_new_revision_supersedes_parent() {
    let (store, _temp) = create_test_store();
    let mut first = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut first);

    let mut second = first.new_revision().unwrap();
    assert_eq!(second.history(), &[first.local_id().to_string()]);
    save_sealed(&store, &mut second);

    assert_eq!(store.leaf_uids().unwrap(), vec![second.uid().clone()]);
    assert_eq!(store.non_leaf_uids().unwrap(), vec![first.uid().clone()]);
    assert!(store.has_newer_revision(first.uid()).unwrap());
    assert!(!store.has_newer_revision(second.uid()).unwrap());
    assert!(store.is_leaf(second.uid()).unwrap());
    assert_eq!(store.bulletin_count().unwrap(), 1);
}

#[test]
fn test_visit_all_bulletins_and_revisions() {
    let (store, _temp) = create_test_store();
    let mut first = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut first);
    let mut second = first.new_revision().unwrap();
    save_sealed(&store, &mut second);
    let mut other = Bulletin::new(&store.account_id().unwrap());
    store.save(&mut other, false).unwrap();

    let mut current = Vec::new();
    store
        .visit_all_bulletins(&mut |key| current.push(key.clone()))
        .unwrap();
    current.sort();
    let mut expected = vec![second.database_key(), other.database_key()];
    expected.sort();
    assert_eq!(current, expected);

    let mut all = 0;
    store.visit_all_bulletin_revisions(&mut |_| all += 1).unwrap();
    assert_eq!(all, 3);
}

#[test]
fn test_field_offices_follow_authorized_readers() {
    let (store, _temp) = create_test_store();
    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    bulletin.add_authorized_reader(ReaderKey::new("reader-account", "Regional office"));
    save_sealed(&store, &mut bulletin);

    assert_eq!(
        store.field_offices("reader-account").unwrap(),
        vec![store.account_id().unwrap()]
    );
    assert!(store.field_offices("stranger").unwrap().is_empty());
}

// ============================================================================
// Attachment Cleanup
// ============================================================================

#[test]
fn test_resave_discards_removed_attachment() {
    let (store, _temp) = create_test_store();
    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    let x = bulletin.add_public_attachment("x", b"x".to_vec());
    let y = bulletin.add_public_attachment("y", b"y".to_vec());
    store.save(&mut bulletin, false).unwrap();

    bulletin.remove_attachment(y.local_id());
    let z = bulletin.add_public_attachment("z", b"z".to_vec());
    store.save(&mut bulletin, false).unwrap();

    let key = bulletin.database_key();
    let db = store.database();
    assert!(!db.exists(&key.sibling(y.local_id())).unwrap());
    assert_eq!(
        store.load_attachment(&key.sibling(x.local_id())).unwrap().payload(),
        b"x"
    );
    assert_eq!(
        store.load_attachment(&key.sibling(z.local_id())).unwrap().payload(),
        b"z"
    );
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn test_cascade_delete_removes_whole_chain() {
    let (store, _temp) = create_test_store();
    let cache = Arc::new(RecordingCache::default());
    store.add_cache(cache.clone());

    let mut a = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut a);
    let mut b = a.new_revision().unwrap();
    save_sealed(&store, &mut b);
    let mut c = b.new_revision().unwrap();
    save_sealed(&store, &mut c);
    assert_eq!(
        c.history(),
        &[a.local_id().to_string(), b.local_id().to_string()]
    );

    store.remove_bulletin_from_store(&c).unwrap();

    let db = store.database();
    for bulletin in [&a, &b, &c] {
        assert!(!db.exists(&bulletin.database_key()).unwrap());
        let data = bulletin.database_key().sibling(bulletin.header().field_data_id());
        assert!(!db.exists(&data).unwrap());
    }
    let removed = cache.removed.lock();
    assert_eq!(removed.len(), 3);
    assert!(removed.values().all(|count| *count == 1));
    assert!(store.leaf_uids().unwrap().is_empty());
}

#[test]
fn test_cache_reads_leaves_during_cascade() {
    let (store, _temp) = create_test_store();
    let watcher = Arc::new(LeafWatchingCache {
        leaves: store.cache_manager().leaf_node_cache().clone(),
        seen: Mutex::new(Vec::new()),
    });
    store.add_cache(watcher.clone());

    let mut a = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut a);
    let mut b = a.new_revision().unwrap();
    save_sealed(&store, &mut b);
    let mut c = b.new_revision().unwrap();
    save_sealed(&store, &mut c);

    store.remove_bulletin_from_store(&c).unwrap();
    assert_eq!(watcher.seen.lock().as_slice(), &[1, 1, 0]);
}

#[test]
fn test_cascade_skips_missing_ancestors() {
    let (store, _temp) = create_test_store();
    let mut a = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut a);
    let mut b = a.new_revision().unwrap();
    save_sealed(&store, &mut b);

    store.delete_bulletin_revision(&a.database_key()).unwrap();
    store.remove_bulletin_from_store(&b).unwrap();
    assert!(!store.database().exists(&b.database_key()).unwrap());
}

#[test]
fn test_cascade_failure_collapses_to_delete_failed() {
    let (store, _temp) = create_test_store();
    let mut a = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut a);
    let mut b = a.new_revision().unwrap();
    save_sealed(&store, &mut b);

    store
        .database()
        .write_record(&a.database_key(), b"corrupt")
        .unwrap();

    assert!(matches!(
        store.remove_bulletin_from_store(&b),
        Err(StoreError::DeleteFailed(_))
    ));
}

#[test]
fn test_single_delete_keeps_typed_error() {
    let (store, _temp) = create_test_store();
    let missing = DatabaseKey::sealed(UniversalId::new(store.account_id().unwrap(), "B-gone"));
    assert!(matches!(
        store.delete_bulletin_revision(&missing),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_delete_all_notifies_caches() {
    let (store, _temp) = create_test_store();
    let cache = Arc::new(RecordingCache::default());
    store.add_cache(cache.clone());

    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    store.save(&mut bulletin, false).unwrap();
    assert_eq!(cache.saved.lock().as_slice(), &[bulletin.uid().clone()]);

    store.delete_all_bulletins().unwrap();
    assert_eq!(*cache.cleared.lock(), 1);
    assert_eq!(store.bulletin_count().unwrap(), 0);
}

// ============================================================================
// Hide
// ============================================================================

#[test]
fn test_hidden_bulletin_is_gone_but_kept() {
    let temp_dir = tempdir().unwrap();
    let db = Arc::new(RedbDatabase::new(temp_dir.path().join("hide.redb"), false).unwrap());
    let security = Arc::new(AccountSecurity::generate().unwrap());
    let notices = temp_dir.path().join("notices.jsonl");
    let store = BulletinStore::new(db, security).with_notice_logger(Arc::new(
        JsonlNoticeLogger::new(&notices, "test").unwrap(),
    ));

    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    save_sealed(&store, &mut bulletin);
    let key = bulletin.database_key();

    store.hide_packets(&[bulletin.uid().clone()]).unwrap();

    assert!(store.database().exists(&key).unwrap());
    assert!(!store.leaf_uids().unwrap().contains(bulletin.uid()));
    assert!(matches!(
        store.load_bulletin(&key),
        Err(StoreError::RecordHidden(_))
    ));

    drop(store);
    let entries = read_notices(&notices).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].msg,
        format!(
            "Deleting {}: {}",
            formatted_public_code(bulletin.account_id()),
            bulletin.local_id()
        )
    );
}

#[test]
fn test_resave_of_hidden_bulletin_fails() {
    let (store, _temp) = create_test_store();
    let mut bulletin = Bulletin::new(&store.account_id().unwrap());
    store.save(&mut bulletin, false).unwrap();
    store.hide_packets(&[bulletin.uid().clone()]).unwrap();

    assert!(matches!(
        store.save(&mut bulletin, false),
        Err(StoreError::RecordHidden(_))
    ));
}
