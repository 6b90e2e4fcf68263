//! Append-only JSONL notice file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use super::entry::NoticeEntry;
use super::NoticeLogger;

/// Notice logger that appends one JSON object per line to a file.
pub struct JsonlNoticeLogger {
    /// Instance name written into every entry
    instance: String,

    writer: Mutex<BufWriter<File>>,

    next_seq: AtomicU64,

    /// Path to the JSONL file
    path: PathBuf,
}

impl JsonlNoticeLogger {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn new(path: impl AsRef<Path>, instance: impl Into<String>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            instance: instance.into(),
            writer: Mutex::new(BufWriter::new(file)),
            next_seq: AtomicU64::new(0),
            path,
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it.
    pub fn write(&self, entry: &NoticeEntry) -> std::io::Result<()> {
        let json = entry
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl NoticeLogger for JsonlNoticeLogger {
    fn log_notice(&self, message: &str) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let entry = NoticeEntry::now(self.instance.as_str(), seq, message);
        if let Err(e) = self.write(&entry) {
            warn!(path = %self.path.display(), error = %e, "Failed to append notice");
        }
    }
}

impl Drop for JsonlNoticeLogger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Read every parseable notice from a JSONL file, oldest first.
pub fn read_notices(path: impl AsRef<Path>) -> std::io::Result<Vec<NoticeEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match NoticeEntry::from_json_line(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unparseable notice"),
        }
    }
    entries.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.seq.cmp(&b.seq)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logger_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("notices.jsonl");

        let logger = JsonlNoticeLogger::new(&path, "office").unwrap();
        assert!(logger.path().exists());
        assert_eq!(logger.instance(), "office");
    }

    #[test]
    fn test_notices_are_appended() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notices.jsonl");

        let logger = JsonlNoticeLogger::new(&path, "office").unwrap();
        logger.log_notice("Deleting 1234.5678.9012.3456.7890: B-1");
        logger.log_notice("Deleting 1234.5678.9012.3456.7890: B-2");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let notices = read_notices(&path).unwrap();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.instance == "office"));
        assert_eq!(notices[1].seq, 1);
        assert!(notices[1].msg.ends_with("B-2"));
    }

    #[test]
    fn test_reopen_keeps_existing_notices() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notices.jsonl");

        JsonlNoticeLogger::new(&path, "a").unwrap().log_notice("first");
        JsonlNoticeLogger::new(&path, "b").unwrap().log_notice("second");

        assert_eq!(read_notices(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_read_skips_garbage_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notices.jsonl");
        let good = NoticeEntry::now("a", 0, "kept").to_json_line().unwrap();
        fs::write(&path, format!("not json\n{}\n\n", good)).unwrap();

        let notices = read_notices(&path).unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].msg, "kept");
        assert!(read_notices(temp.path().join("missing.jsonl")).unwrap().is_empty());
    }
}
