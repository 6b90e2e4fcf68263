//! Store configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Where and how a [`crate::BulletinStore`] keeps its packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    pub database_file: String,
    /// Encrypt field-data and attachment packets at rest
    pub must_encrypt_local_data: bool,
    /// Where import stages packets before committing; system temp dir if unset
    pub import_staging_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./bulletin-data"),
            database_file: "bulletins.redb".to_string(),
            must_encrypt_local_data: true,
            import_staging_dir: None,
        }
    }
}

impl StoreConfig {
    /// Config rooted at `data_dir` with every other setting defaulted
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Full path of the database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Directory import stages packets in
    pub fn staging_dir(&self) -> PathBuf {
        self.import_staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Write as pretty-printed JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
