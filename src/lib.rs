#![doc = include_str!("../README.md")]

mod bytes;
pub mod config;
mod crypt;
mod db;
mod entry;
mod error;
mod fields;
mod group;
mod header;
mod key;
mod progress;
mod secure_bytes;
mod tree;
mod warnings;

pub use crate::config::DatabaseConfig;
pub use crate::db::Database;
pub use crate::entry::{secret_string, Attachment, Entry};
pub use crate::error::{
    CryptographyError, DatabaseKeyError, DatabaseOpenError, DatabaseSaveError, FieldError, HeaderError,
    MasterKeyError, RngError,
};
pub use crate::group::Group;
pub use crate::header::OuterCipher;
pub use crate::key::CompositeKey;
pub use crate::progress::{phase, weight, Cancelled, Progress};
pub use crate::secure_bytes::SecureBytes;
pub use crate::warnings::Warning;

// see https://gist.github.com/lgg/e6ccc6e212d18dd2ecd8a8c116fb1e45 for file format details
