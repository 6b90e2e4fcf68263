//! Account identity for bulletin authors
//!
//! Every bulletin is authored by one account. The account id is the base58
//! encoding of the author's Ed25519 verifying key, so anyone holding a packet
//! can check its signature from the account id alone.
//!
//! ## Example
//!
//! ```rust
//! use bulletinstore_core::identity::{verify_signature, AccountKeypair};
//!
//! let keypair = AccountKeypair::generate();
//! let account_id = keypair.account_id();
//!
//! let signature = keypair.sign(b"incident report");
//! assert!(verify_signature(&account_id, b"incident report", &signature));
//! ```

mod keypair;
mod public_code;
mod signature;

pub use keypair::{verify_signature, AccountKeypair};
pub use public_code::formatted_public_code;
pub use signature::PacketSignature;
