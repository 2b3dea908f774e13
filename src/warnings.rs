//! Non-fatal anomalies surfaced alongside a successful `load`, distinct from
//! the `Err` path reserved for unrecoverable conditions.

use thiserror::Error;

/// A recoverable anomaly encountered while loading a database.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Two groups in the file declared the same id; the second was
    /// transparently reassigned a fresh one.
    #[error("duplicate group id {original} was reassigned to {reassigned}")]
    DuplicateGroupId {
        /// the id as read from the file
        original: i32,
        /// the id the group was given in memory instead
        reassigned: i32,
    },
}
