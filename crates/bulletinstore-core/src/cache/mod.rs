//! Derived caches over the packet database
//!
//! ```text
//! ┌──────────────┐  revision_was_saved    ┌───────────────┐
//! │ BulletinStore│ ─────────────────────▶ │ CacheManager  │
//! └──────────────┘  revision_was_removed  └───────┬───────┘
//!                   store_was_cleared             │ in registration order
//!                                     ┌───────────┼───────────┐
//!                                     ▼           ▼           ▼
//!                               LeafNodeCache  cache #2  ...  cache #n
//! ```
//!
//! The leaf cache is always registered first, so later caches can rely on
//! leaf classification being invalidated before they are notified.

mod leaf_node;

pub use leaf_node::LeafNodeCache;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::packet::UniversalId;

/// A cache that must be told about store mutations.
///
/// Notifications can arrive while the store holds its cascade lock, so an
/// implementation must not call back into the store's leaf queries. Leaf
/// state is read through [`CacheManager::leaf_node_cache`] instead.
pub trait StoreCache: Send + Sync {
    /// A revision was written
    fn revision_was_saved(&self, uid: &UniversalId);

    /// A revision was deleted or hidden
    fn revision_was_removed(&self, uid: &UniversalId);

    /// Every record was removed
    fn store_was_cleared(&self);
}

/// Ordered registry of caches owned by one store.
pub struct CacheManager {
    leaf_node_cache: Arc<LeafNodeCache>,
    caches: RwLock<Vec<Arc<dyn StoreCache>>>,
}

impl CacheManager {
    /// Create a manager with the leaf cache registered first.
    pub fn new(leaf_node_cache: Arc<LeafNodeCache>) -> Self {
        let first: Arc<dyn StoreCache> = leaf_node_cache.clone();
        Self {
            leaf_node_cache,
            caches: RwLock::new(vec![first]),
        }
    }

    /// The leaf cache registered at construction
    pub fn leaf_node_cache(&self) -> &Arc<LeafNodeCache> {
        &self.leaf_node_cache
    }

    /// Register a cache after every existing one.
    pub fn add_cache(&self, cache: Arc<dyn StoreCache>) {
        self.caches.write().push(cache);
    }

    /// Number of registered caches, the leaf cache included
    pub fn cache_count(&self) -> usize {
        self.caches.read().len()
    }

    pub fn revision_was_saved(&self, uid: &UniversalId) {
        for cache in self.snapshot() {
            cache.revision_was_saved(uid);
        }
    }

    pub fn revision_was_removed(&self, uid: &UniversalId) {
        for cache in self.snapshot() {
            cache.revision_was_removed(uid);
        }
    }

    pub fn store_was_cleared(&self) {
        for cache in self.snapshot() {
            cache.store_was_cleared();
        }
    }

    /// Registered caches in order, without holding the lock while notifying
    fn snapshot(&self) -> Vec<Arc<dyn StoreCache>> {
        self.caches.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountSecurity;
    use crate::database::MemoryDatabase;
    use parking_lot::Mutex;

    /// Appends `<name>:<event>` to a shared journal
    struct JournalCache {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl StoreCache for JournalCache {
        fn revision_was_saved(&self, uid: &UniversalId) {
            self.journal
                .lock()
                .push(format!("{}:saved:{}", self.name, uid.local_id()));
        }

        fn revision_was_removed(&self, uid: &UniversalId) {
            self.journal
                .lock()
                .push(format!("{}:removed:{}", self.name, uid.local_id()));
        }

        fn store_was_cleared(&self) {
            self.journal.lock().push(format!("{}:cleared", self.name));
        }
    }

    fn create_test_manager() -> CacheManager {
        let leaf = LeafNodeCache::new(
            Arc::new(MemoryDatabase::default()),
            Arc::new(AccountSecurity::without_keypair()),
        );
        CacheManager::new(Arc::new(leaf))
    }

    #[test]
    fn test_leaf_cache_registered_first() {
        let manager = create_test_manager();
        assert_eq!(manager.cache_count(), 1);
    }

    #[test]
    fn test_notifications_follow_registration_order() {
        let manager = create_test_manager();
        let journal = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            manager.add_cache(Arc::new(JournalCache {
                name,
                journal: journal.clone(),
            }));
        }

        let uid = UniversalId::new("acct", "B-1");
        manager.revision_was_saved(&uid);
        manager.revision_was_removed(&uid);
        manager.store_was_cleared();

        assert_eq!(
            *journal.lock(),
            vec![
                "first:saved:B-1",
                "second:saved:B-1",
                "first:removed:B-1",
                "second:removed:B-1",
                "first:cleared",
                "second:cleared",
            ]
        );
        assert_eq!(manager.cache_count(), 3);
    }
}
