use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{hidden_key, PacketDatabase};
use crate::error::{StoreError, StoreResult};
use crate::packet::{DatabaseKey, UniversalId};

/// In-memory packet database using ordered maps
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    inner: Arc<RwLock<MemoryDatabaseInner>>,
    must_encrypt_local_data: bool,
}

#[derive(Debug, Default)]
struct MemoryDatabaseInner {
    /// Stored frames by key
    packets: BTreeMap<DatabaseKey, Vec<u8>>,
    /// Hidden uids, by hidden row key
    hidden: BTreeSet<String>,
}

impl MemoryDatabase {
    pub fn new(must_encrypt_local_data: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryDatabaseInner::default())),
            must_encrypt_local_data,
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PacketDatabase for MemoryDatabase {
    fn exists(&self, key: &DatabaseKey) -> StoreResult<bool> {
        Ok(self.inner.read().packets.contains_key(key))
    }

    fn read_record(&self, key: &DatabaseKey) -> StoreResult<Vec<u8>> {
        let inner = self.inner.read();
        if inner.hidden.contains(&hidden_key(key.uid())) {
            return Err(StoreError::RecordHidden(key.to_string()));
        }
        inner
            .packets
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn write_record(&self, key: &DatabaseKey, stored: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let row = hidden_key(key.uid());
        if inner.hidden.contains(&row) {
            return Err(StoreError::RecordHidden(row));
        }
        inner.packets.insert(key.clone(), stored.to_vec());
        Ok(())
    }

    fn discard(&self, key: &DatabaseKey) -> StoreResult<()> {
        self.inner.write().packets.remove(key);
        Ok(())
    }

    fn hide(&self, uid: &UniversalId) -> StoreResult<()> {
        self.inner.write().hidden.insert(hidden_key(uid));
        Ok(())
    }

    fn is_hidden(&self, uid: &UniversalId) -> StoreResult<bool> {
        Ok(self.inner.read().hidden.contains(&hidden_key(uid)))
    }

    fn visit_all_records(&self, visitor: &mut dyn FnMut(&DatabaseKey, &[u8])) -> StoreResult<()> {
        let inner = self.inner.read();
        for (key, bytes) in &inner.packets {
            if !inner.hidden.contains(&hidden_key(key.uid())) {
                visitor(key, bytes);
            }
        }
        Ok(())
    }

    fn import_files(&self, files: &HashMap<DatabaseKey, PathBuf>) -> StoreResult<()> {
        let mut staged = Vec::with_capacity(files.len());
        for (key, path) in files {
            staged.push((key.clone(), std::fs::read(path)?));
        }

        let mut inner = self.inner.write();
        if let Some(row) = staged
            .iter()
            .map(|(key, _)| hidden_key(key.uid()))
            .find(|row| inner.hidden.contains(row))
        {
            return Err(StoreError::RecordHidden(row));
        }
        inner.packets.extend(staged);
        Ok(())
    }

    fn must_encrypt_local_data(&self) -> bool {
        self.must_encrypt_local_data
    }

    fn delete_all(&self) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.packets.clear();
        inner.hidden.clear();
        Ok(())
    }
}
