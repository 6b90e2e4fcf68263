//! Store notices.
//!
//! Diagnostic logging goes through `tracing` everywhere in the crate. A
//! notice is different: it is an audit line the store must emit for certain
//! operations (hiding packets), delivered to a [`NoticeLogger`].
//!
//! Two loggers are provided:
//! - [`TracingNoticeLogger`] forwards notices as `tracing` events
//! - [`JsonlNoticeLogger`] appends them to a JSON-lines file
//!
//! ## Querying notices with jq
//!
//! ```bash
//! # Every hide notice for one account
//! jq 'select(.msg | startswith("Deleting 1234.5678"))' notices.jsonl
//! ```

pub mod entry;
pub mod writer;

pub use entry::NoticeEntry;
pub use writer::{read_notices, JsonlNoticeLogger};

use crate::identity::formatted_public_code;
use crate::packet::UniversalId;

/// Audit sink for store notices.
pub trait NoticeLogger: Send + Sync {
    fn log_notice(&self, message: &str);
}

/// Forwards notices to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNoticeLogger;

impl NoticeLogger for TracingNoticeLogger {
    fn log_notice(&self, message: &str) {
        tracing::info!(notice = true, "{}", message);
    }
}

/// Notice text for a hidden packet: `Deleting <public code>: <local id>`
pub fn hide_notice(uid: &UniversalId) -> String {
    format!(
        "Deleting {}: {}",
        formatted_public_code(uid.account_id()),
        uid.local_id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AccountKeypair;

    #[test]
    fn test_hide_notice_format() {
        let account = AccountKeypair::generate().account_id();
        let notice = hide_notice(&UniversalId::new(account.clone(), "B-01J"));

        let code = formatted_public_code(&account);
        assert_eq!(notice, format!("Deleting {}: B-01J", code));
    }

    #[test]
    fn test_tracing_logger_accepts_notices() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        TracingNoticeLogger.log_notice("Deleting 0000.0000.0000.0000.0000: B-1");
    }
}
