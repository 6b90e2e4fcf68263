//! Zip form of one bulletin revision
//!
//! A flat archive with one entry per packet, named by the packet's local
//! id. Each entry holds an encoded [`PacketRecord`]: signed, never
//! encrypted at rest, so any holder can verify it without keys.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use zip::{result::ZipError, write::FileOptions, CompressionMethod, ZipArchive};

use crate::error::{StoreError, StoreResult};
use crate::packet::{PacketKind, PacketRecord};

/// Write `records` to a new zip at `path`, replacing any existing file.
pub fn write_packet_zip(path: &Path, records: &[PacketRecord]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options: FileOptions<'_, ()> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);

    for record in records {
        zip.start_file(record.local_id.as_str(), options)?;
        zip.write_all(&record.encode()?)?;
    }
    zip.finish()?;
    Ok(())
}

/// Read side of a packet zip.
pub struct PacketZip {
    archive: ZipArchive<File>,
}

impl PacketZip {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = File::open(path)?;
        Ok(Self {
            archive: ZipArchive::new(file)?,
        })
    }

    /// Entry names, which are packet local ids
    pub fn local_ids(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Decode the entry named `local_id`.
    ///
    /// A missing entry or an entry holding a record with another local id
    /// is an `InvalidPacket`.
    pub fn read_record(&mut self, local_id: &str) -> StoreResult<PacketRecord> {
        let mut entry = match self.archive.by_name(local_id) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(StoreError::InvalidPacket(format!(
                    "Archive has no entry {}",
                    local_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;

        let record = PacketRecord::decode(&bytes)?;
        if record.local_id != local_id {
            return Err(StoreError::InvalidPacket(format!(
                "Entry {} holds packet {}",
                local_id, record.local_id
            )));
        }
        Ok(record)
    }

    /// The one header record in the archive, unverified.
    pub fn header_record(&mut self) -> StoreResult<PacketRecord> {
        let mut headers = self
            .local_ids()
            .into_iter()
            .filter(|id| PacketKind::is_header_local_id(id));
        let local_id = match (headers.next(), headers.next()) {
            (Some(id), None) => id,
            (None, _) => {
                return Err(StoreError::InvalidPacket(
                    "Archive has no header packet".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(StoreError::InvalidPacket(
                    "Archive has more than one header packet".to_string(),
                ))
            }
        };
        let record = self.read_record(&local_id)?;
        record.expect_kind(PacketKind::Header)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AccountSecurity, SecurityProvider};
    use crate::packet::UniversalId;
    use tempfile::TempDir;

    fn record(security: &AccountSecurity, kind: PacketKind, body: &[u8]) -> PacketRecord {
        let uid = UniversalId::generate(security.account_id().unwrap(), kind);
        PacketRecord::create(kind, &uid, body.to_vec(), security).unwrap()
    }

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("bulletin.zip");
        let security = AccountSecurity::generate().unwrap();

        let header = record(&security, PacketKind::Header, b"header text");
        let data = record(&security, PacketKind::PublicData, b"fields");
        write_packet_zip(&path, &[header.clone(), data.clone()]).unwrap();

        let mut zip = PacketZip::open(&path).unwrap();
        let mut ids = zip.local_ids();
        ids.sort();
        let mut expected = vec![header.local_id.clone(), data.local_id.clone()];
        expected.sort();
        assert_eq!(ids, expected);

        let read_header = zip.header_record().unwrap();
        assert_eq!(read_header.body, b"header text");
        assert!(read_header.verify(&security));
        assert_eq!(zip.read_record(&data.local_id).unwrap().body, b"fields");
    }

    #[test]
    fn test_missing_entry_is_invalid_packet() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bulletin.zip");
        let security = AccountSecurity::generate().unwrap();
        write_packet_zip(&path, &[record(&security, PacketKind::Header, b"h")]).unwrap();

        let mut zip = PacketZip::open(&path).unwrap();
        assert!(matches!(
            zip.read_record("F-missing"),
            Err(StoreError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_header_must_be_unique() {
        let temp = TempDir::new().unwrap();
        let security = AccountSecurity::generate().unwrap();

        let none = temp.path().join("none.zip");
        write_packet_zip(&none, &[record(&security, PacketKind::PublicData, b"d")]).unwrap();
        assert!(PacketZip::open(&none).unwrap().header_record().is_err());

        let two = temp.path().join("two.zip");
        write_packet_zip(
            &two,
            &[
                record(&security, PacketKind::Header, b"1"),
                record(&security, PacketKind::Header, b"2"),
            ],
        )
        .unwrap();
        assert!(PacketZip::open(&two).unwrap().header_record().is_err());
    }

    #[test]
    fn test_not_a_zip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("garbage.zip");
        fs::write(&path, b"definitely not a zip").unwrap();
        assert!(matches!(PacketZip::open(&path), Err(StoreError::Zip(_))));
    }
}
