//! One notice as a JSON line.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A notice written by [`super::JsonlNoticeLogger`].
///
/// `seq` counts notices within one logger, so notices stamped in the same
/// millisecond still read back in write order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeEntry {
    /// RFC 3339 UTC timestamp with millisecond precision
    pub ts: String,
    pub seq: u64,
    /// Store instance that wrote the notice
    pub instance: String,
    pub msg: String,
}

impl NoticeEntry {
    pub fn now(instance: impl Into<String>, seq: u64, msg: impl Into<String>) -> Self {
        Self::at(Utc::now(), instance, seq, msg)
    }

    pub fn at(
        time: DateTime<Utc>,
        instance: impl Into<String>,
        seq: u64,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: time.to_rfc3339_opts(SecondsFormat::Millis, true),
            seq,
            instance: instance.into(),
            msg: msg.into(),
        }
    }

    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_notice_line_shape() {
        let time = Utc.with_ymd_and_hms(2026, 3, 9, 8, 15, 0).unwrap();
        let entry = NoticeEntry::at(time, "field-laptop", 7, "Deleting x: B-1");

        let json = entry.to_json_line().unwrap();
        assert!(json.starts_with("{\"ts\":\"2026-03-09T08:15:00.000Z\""));
        assert!(json.contains("\"seq\":7"));
        assert!(!json.contains('\n'));
        assert_eq!(NoticeEntry::from_json_line(&json).unwrap(), entry);
    }
}
