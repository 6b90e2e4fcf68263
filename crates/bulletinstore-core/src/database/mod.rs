//! Packet database capability
//!
//! The store addresses stored packets by [`DatabaseKey`] and treats their
//! bytes as opaque stored frames. Two backends are provided:
//!
//! - [`RedbDatabase`]: persistent, one redb file
//! - [`MemoryDatabase`]: in-process maps, for tests and embedding

mod memory;
mod redb;

pub use self::memory::MemoryDatabase;
pub use self::redb::RedbDatabase;

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::StoreResult;
use crate::packet::{DatabaseKey, UniversalId};

/// Blob storage keyed by [`DatabaseKey`].
pub trait PacketDatabase: Send + Sync {
    /// Whether bytes are stored at `key`. Hidden records still exist.
    fn exists(&self, key: &DatabaseKey) -> StoreResult<bool>;

    /// Read the stored bytes at `key`.
    ///
    /// Fails with `RecordHidden` if the uid was hidden and `NotFound` if
    /// nothing is stored there.
    fn read_record(&self, key: &DatabaseKey) -> StoreResult<Vec<u8>>;

    /// Store bytes at `key`, replacing any previous value.
    fn write_record(&self, key: &DatabaseKey, stored: &[u8]) -> StoreResult<()>;

    /// Remove whatever is stored at `key`. Missing keys are not an error.
    fn discard(&self, key: &DatabaseKey) -> StoreResult<()>;

    /// Tombstone a uid under every status without deleting its bytes.
    fn hide(&self, uid: &UniversalId) -> StoreResult<()>;

    /// Whether `uid` has been hidden
    fn is_hidden(&self, uid: &UniversalId) -> StoreResult<bool>;

    /// Visit every visible record from one consistent snapshot.
    fn visit_all_records(&self, visitor: &mut dyn FnMut(&DatabaseKey, &[u8])) -> StoreResult<()>;

    /// Store every staged file under its key, all or nothing.
    fn import_files(&self, files: &HashMap<DatabaseKey, PathBuf>) -> StoreResult<()>;

    /// Whether saved packets must be encrypted at rest
    fn must_encrypt_local_data(&self) -> bool;

    /// Remove every record and tombstone.
    fn delete_all(&self) -> StoreResult<()>;
}

/// Row key of a hidden uid, shared by both backends
fn hidden_key(uid: &UniversalId) -> String {
    format!("{}:{}", uid.account_id(), uid.local_id())
}
