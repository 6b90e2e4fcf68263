//! Bulletin Store Core Library
//!
//! Signed, selectively encrypted storage for bulletins: versioned records
//! made of a header packet, public and private field-data packets, and
//! attachment packets.
//!
//! ## Overview
//!
//! Every packet is signed by its author. Private content is always
//! encrypted; public content is encrypted while a bulletin is a draft or
//! marked all-private. Each revision names its ancestors in its header, and
//! the store keeps a cache of which revisions are current ("leaves").
//! Revisions travel between stores as zip archives that any holder can
//! verify.
//!
//! ## Core Principles
//!
//! - **Header last**: a revision exists once its header is written
//! - **Verify before use**: every packet read is checked against its author
//! - **All-or-nothing import**: a bad packet in an archive imports nothing
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulletinstore_core::{AccountSecurity, Bulletin, BulletinStore, StoreConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let security = Arc::new(AccountSecurity::generate()?);
//!     let store = BulletinStore::open(&StoreConfig::with_data_dir("./data"), security)?;
//!
//!     let mut bulletin = Bulletin::new(&store.account_id()?);
//!     bulletin.set_public_payload(b"title=Checkpoint closure".to_vec());
//!     bulletin.set_sealed();
//!     store.save(&mut bulletin, false)?;
//!
//!     for key in store.leaf_keys()? {
//!         println!("{}", key);
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod bulletin;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod identity;
pub mod logging;
pub mod packet;
pub mod store;

// Re-exports
pub use bulletin::Bulletin;
pub use cache::{CacheManager, LeafNodeCache, StoreCache};
pub use config::StoreConfig;
pub use crypto::{AccountSecurity, SecurityProvider};
pub use database::{MemoryDatabase, PacketDatabase, RedbDatabase};
pub use error::{StoreError, StoreResult};
pub use identity::{formatted_public_code, AccountKeypair, PacketSignature};
pub use logging::{JsonlNoticeLogger, NoticeLogger, TracingNoticeLogger};
pub use packet::{
    AttachmentPacket, DatabaseKey, FieldDataPacket, HeaderPacket, PacketKind, PacketRecord,
    ReaderKey, RevisionStatus, UniversalId,
};
pub use store::BulletinStore;
