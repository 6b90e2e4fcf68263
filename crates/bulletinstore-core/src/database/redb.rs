//! Persistent packet database using redb.
//!
//! Two tables in one file:
//! - `packets`: storage key -> stored frame bytes
//! - `hidden`: hidden uid -> time it was hidden (ms)

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, warn};

use super::{hidden_key, PacketDatabase};
use crate::error::{StoreError, StoreResult};
use crate::packet::{DatabaseKey, UniversalId};

const PACKETS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("packets");
const HIDDEN_TABLE: TableDefinition<&str, i64> = TableDefinition::new("hidden");

/// Packet database backed by a redb file.
#[derive(Clone)]
pub struct RedbDatabase {
    db: Arc<RwLock<Database>>,
    must_encrypt_local_data: bool,
}

impl RedbDatabase {
    /// Open or create the database at `path`.
    ///
    /// Creates the parent directory and both tables if needed.
    pub fn new(path: impl AsRef<Path>, must_encrypt_local_data: bool) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PACKETS_TABLE)?;
            let _ = write_txn.open_table(HIDDEN_TABLE)?;
        }
        write_txn.commit()?;

        debug!(path = %path.display(), "Opened packet database");
        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            must_encrypt_local_data,
        })
    }

    /// First uid among `keys` that is hidden in this transaction
    fn find_hidden(
        write_txn: &WriteTransaction,
        keys: &[&DatabaseKey],
    ) -> StoreResult<Option<String>> {
        let hidden = write_txn.open_table(HIDDEN_TABLE)?;
        for key in keys {
            let row = hidden_key(key.uid());
            if hidden.get(row.as_str())?.is_some() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

impl PacketDatabase for RedbDatabase {
    fn exists(&self, key: &DatabaseKey) -> StoreResult<bool> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(PACKETS_TABLE)?;
        Ok(table.get(key.storage_key().as_str())?.is_some())
    }

    fn read_record(&self, key: &DatabaseKey) -> StoreResult<Vec<u8>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;

        let hidden = read_txn.open_table(HIDDEN_TABLE)?;
        if hidden.get(hidden_key(key.uid()).as_str())?.is_some() {
            return Err(StoreError::RecordHidden(key.to_string()));
        }

        let table = read_txn.open_table(PACKETS_TABLE)?;
        match table.get(key.storage_key().as_str())? {
            Some(v) => Ok(v.value().to_vec()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn write_record(&self, key: &DatabaseKey, stored: &[u8]) -> StoreResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        if let Some(uid) = Self::find_hidden(&write_txn, &[key])? {
            write_txn.abort()?;
            return Err(StoreError::RecordHidden(uid));
        }
        {
            let mut table = write_txn.open_table(PACKETS_TABLE)?;
            table.insert(key.storage_key().as_str(), stored)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn discard(&self, key: &DatabaseKey) -> StoreResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(PACKETS_TABLE)?;
            table.remove(key.storage_key().as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn hide(&self, uid: &UniversalId) -> StoreResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(HIDDEN_TABLE)?;
            let now = chrono::Utc::now().timestamp_millis();
            table.insert(hidden_key(uid).as_str(), now)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn is_hidden(&self, uid: &UniversalId) -> StoreResult<bool> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(HIDDEN_TABLE)?;
        Ok(table.get(hidden_key(uid).as_str())?.is_some())
    }

    fn visit_all_records(&self, visitor: &mut dyn FnMut(&DatabaseKey, &[u8])) -> StoreResult<()> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;

        let hidden_table = read_txn.open_table(HIDDEN_TABLE)?;
        let mut hidden = HashSet::new();
        for entry in hidden_table.iter()? {
            let (k, _) = entry?;
            hidden.insert(k.value().to_string());
        }

        let table = read_txn.open_table(PACKETS_TABLE)?;
        for entry in table.iter()? {
            let (k, v) = entry?;
            let key = match DatabaseKey::from_storage_key(k.value()) {
                Ok(key) => key,
                Err(e) => {
                    warn!(row = k.value(), error = %e, "Skipping unreadable row");
                    continue;
                }
            };
            if hidden.contains(&hidden_key(key.uid())) {
                continue;
            }
            visitor(&key, v.value());
        }
        Ok(())
    }

    fn import_files(&self, files: &HashMap<DatabaseKey, PathBuf>) -> StoreResult<()> {
        // Read every staged file before touching the database
        let mut staged = Vec::with_capacity(files.len());
        for (key, path) in files {
            staged.push((key, std::fs::read(path)?));
        }

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        let keys: Vec<&DatabaseKey> = staged.iter().map(|(key, _)| *key).collect();
        if let Some(uid) = Self::find_hidden(&write_txn, &keys)? {
            write_txn.abort()?;
            return Err(StoreError::RecordHidden(uid));
        }
        {
            let mut table = write_txn.open_table(PACKETS_TABLE)?;
            for (key, bytes) in &staged {
                table.insert(key.storage_key().as_str(), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;

        debug!(count = staged.len(), "Imported staged packets");
        Ok(())
    }

    fn must_encrypt_local_data(&self) -> bool {
        self.must_encrypt_local_data
    }

    fn delete_all(&self) -> StoreResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        write_txn.delete_table(PACKETS_TABLE)?;
        write_txn.delete_table(HIDDEN_TABLE)?;
        {
            let _ = write_txn.open_table(PACKETS_TABLE)?;
            let _ = write_txn.open_table(HIDDEN_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests as shared;
    use tempfile::TempDir;

    fn create_test_database() -> (RedbDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = RedbDatabase::new(temp_dir.path().join("packets.redb"), true).unwrap();
        (db, temp_dir)
    }

    #[test]
    fn test_database_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("packets.redb");
        let db = RedbDatabase::new(&path, false).unwrap();
        assert!(path.exists());
        assert!(!db.must_encrypt_local_data());
    }

    #[test]
    fn test_read_write_discard() {
        let (db, _dir) = create_test_database();
        shared::check_read_write_discard(&db);
    }

    #[test]
    fn test_hide() {
        let (db, _dir) = create_test_database();
        shared::check_hide(&db);
    }

    #[test]
    fn test_import_files() {
        let (db, _dir) = create_test_database();
        shared::check_import_files(&db);
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let (db, _dir) = create_test_database();
        shared::check_import_is_all_or_nothing(&db);
    }

    #[test]
    fn test_delete_all() {
        let (db, _dir) = create_test_database();
        shared::check_delete_all(&db);
    }

    #[test]
    fn test_records_persist_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("packets.redb");
        let key = DatabaseKey::sealed(UniversalId::new("acct", "B-1"));

        {
            let db = RedbDatabase::new(&path, true).unwrap();
            db.write_record(&key, b"persisted").unwrap();
            db.hide(&UniversalId::new("acct", "B-2")).unwrap();
        }

        let db = RedbDatabase::new(&path, true).unwrap();
        assert_eq!(db.read_record(&key).unwrap(), b"persisted");
        assert!(db.is_hidden(&UniversalId::new("acct", "B-2")).unwrap());
    }
}
