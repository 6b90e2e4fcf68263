//! Error types for the bulletin store

use thiserror::Error;

/// Main error type for bulletin store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// A header or data signature does not match the claimed author
    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    /// The claimed author does not match the actual signer
    #[error("Wrong account: expected {expected}, found {actual}")]
    WrongAccount { expected: String, actual: String },

    /// A loaded packet's kind doesn't match what the caller asked for
    #[error("Wrong packet type: expected {expected}, found {actual}")]
    WrongPacketType { expected: String, actual: String },

    /// Decryption failed (wrong key, tampered data, or malformed input)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Load attempted on a hidden (tombstoned) record
    #[error("Record hidden: {0}")]
    RecordHidden(String),

    /// Structurally malformed packet
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// No keypair is available for signing or decryption
    #[error("No signing identity available")]
    MissingKeyPair,

    /// No record exists at the requested key
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A cascading delete failed somewhere along the ancestry chain
    #[error("Unable to delete bulletin: {0}")]
    DeleteFailed(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
}

/// Result type alias using StoreError
pub type StoreResult<T> = Result<T, StoreError>;
