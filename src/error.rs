//! Error types that this crate can return

use thiserror::Error;

/// Errors upon reading a database
#[derive(Debug, Error)]
pub enum DatabaseOpenError {
    /// The fixed header could not be parsed
    #[error(transparent)]
    Header(#[from] HeaderError),

    /// An error with the database's key has occurred
    #[error(transparent)]
    Key(#[from] DatabaseKeyError),

    /// A cryptographic operation failed
    #[error(transparent)]
    Cryptography(#[from] CryptographyError),

    /// The payload was decrypted but its content does not parse as a valid group/entry stream
    #[error(transparent)]
    Field(#[from] FieldError),

    /// An entry referenced a group id that does not exist
    #[error("entry references unknown group id {group_id}")]
    OrphanedEntry {
        /// the dangling group id the entry pointed to
        group_id: u32,
    },

    /// The post-decryption content hash did not match the header, so the supplied key is wrong
    /// (or the ciphertext was tampered with)
    #[error("incorrect composite key or corrupted database")]
    InvalidKey,

    /// The load was cancelled cooperatively before it completed
    #[error(transparent)]
    Cancelled(#[from] crate::progress::Cancelled),
}

/// Errors occurring when saving a database
#[derive(Debug, Error)]
pub enum DatabaseSaveError {
    /// An error with the key occurred while writing the database
    #[error(transparent)]
    Key(#[from] DatabaseKeyError),

    /// A cryptographic operation failed
    #[error(transparent)]
    Cryptography(#[from] CryptographyError),

    /// An error getting randomness for the header's seeds occurred
    #[error(transparent)]
    Rng(#[from] RngError),

    /// The save was cancelled cooperatively before it completed
    #[error(transparent)]
    Cancelled(#[from] crate::progress::Cancelled),
}

/// Errors while parsing the fixed-layout KDB header
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum HeaderError {
    /// The buffer is shorter than the fixed 124-byte header
    #[error("header truncated: got {size} bytes, need at least 124")]
    Truncated {
        /// the number of bytes actually available
        size: usize,
    },

    /// The magic signature bytes did not match the KDB v1 identifiers
    #[error("not a KeePass v1 database (signature mismatch)")]
    BadSignature,

    /// The version field, masked with 0xFFFFFF00, did not equal 0x00030004
    #[error("unsupported KDB version: {version:#010x}")]
    BadVersion {
        /// the raw version field read from the file
        version: u32,
    },

    /// Neither (or both) of the AES/Twofish cipher flag bits were set
    #[error("invalid or ambiguous cipher flags: {flags:#010x}")]
    BadCipherFlags {
        /// the raw flags field read from the file
        flags: u32,
    },
}

/// Errors while parsing a single group or entry field record
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FieldError {
    /// The stream ended before a declared field could be fully read
    #[error("unexpected end of data while reading {context}")]
    PrematureEnd {
        /// what the reader was trying to read when it ran out of bytes
        context: &'static str,
    },

    /// A field's declared length did not match what its type requires
    #[error("field {field_name} has invalid length {actual} (expected {expected})")]
    BadLength {
        /// human-readable name of the offending field
        field_name: &'static str,
        /// the length actually present on the wire
        actual: u32,
        /// the length this field type requires
        expected: u32,
    },

    /// A length-prefixed string was not valid UTF-8
    #[error("field {field_name} is not valid UTF-8")]
    BadUtf8 {
        /// human-readable name of the offending field
        field_name: &'static str,
    },

    /// A record ended (hit the 0xFFFF terminator) without a required field having been seen
    #[error("record is missing required field {field_name}")]
    MissingField {
        /// the field that was required but never appeared
        field_name: &'static str,
    },
}

/// Errors related to building or applying the database key
#[derive(Debug, Error)]
pub enum DatabaseKeyError {
    /// Neither a password nor a key-file was supplied
    #[error("no key material supplied (need a password, a key-file, or both)")]
    EmptyKey,

    /// A composite key was not the 32 bytes the KDF requires
    #[error("composite key has invalid length {actual} (expected 32)")]
    InvalidLength {
        /// the length actually supplied
        actual: usize,
    },

    /// A cryptographic operation failed while hashing key material
    #[error(transparent)]
    Cryptography(#[from] CryptographyError),
}

/// Errors deriving the master key from a composite key, shared by the load
/// and save pipelines, each of which converts it into their own top-level error.
#[derive(Debug, Error)]
pub enum MasterKeyError {
    /// The composite key itself was malformed
    #[error(transparent)]
    Key(#[from] DatabaseKeyError),

    /// Cooperative cancellation was requested mid-derivation
    #[error(transparent)]
    Cancelled(#[from] crate::progress::Cancelled),
}

impl From<MasterKeyError> for DatabaseOpenError {
    fn from(e: MasterKeyError) -> Self {
        match e {
            MasterKeyError::Key(k) => DatabaseOpenError::Key(k),
            MasterKeyError::Cancelled(c) => DatabaseOpenError::Cancelled(c),
        }
    }
}

impl From<MasterKeyError> for DatabaseSaveError {
    fn from(e: MasterKeyError) -> Self {
        match e {
            MasterKeyError::Key(k) => DatabaseSaveError::Key(k),
            MasterKeyError::Cancelled(c) => DatabaseSaveError::Cancelled(c),
        }
    }
}

/// Errors while performing cryptographic operations
#[derive(Debug, Error)]
pub enum CryptographyError {
    /// The key or IV supplied to a cipher had the wrong length
    #[error(transparent)]
    InvalidLength(#[from] cipher::InvalidLength),

    /// PKCS#7 unpadding failed after decryption
    #[error("decryption failed: invalid padding")]
    Unpadding,

    /// PKCS#7 padding failed while encrypting
    #[error(transparent)]
    Padding(#[from] cipher::inout::PadError),
}

/// The system's secure random number generator was unavailable
#[derive(Debug, Error)]
#[error(transparent)]
pub struct RngError(#[from] pub getrandom::Error);
