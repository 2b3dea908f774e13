//! Cooperative progress reporting and cancellation for `load`/`save`.
//!
//! A [`Progress`] handle is passed by reference into each stage of the
//! pipeline rather than threaded through global state. It tracks a 0-100
//! percent-complete scalar and a cancel flag that the caller can set from
//! another thread while `load`/`save` runs on a worker.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use thiserror::Error;

/// The human-readable phase labels emitted while driving the pipeline.
pub mod phase {
    /// Deriving the master key from the composite key (KDF rounds).
    pub const KEY_DERIVATION: &str = "Key derivation";
    /// Decrypting the payload with the outer cipher.
    pub const DECRYPTION: &str = "Decryption";
    /// Parsing the decrypted payload into groups and entries.
    pub const PARSING_CONTENT: &str = "Parsing content";
    /// Serializing groups and entries back into a flat byte buffer.
    pub const PACKING_CONTENT: &str = "Packing the content";
    /// Encrypting the packed payload with the outer cipher.
    pub const ENCRYPTION: &str = "Encryption";
}

/// The weight (out of 100) each pipeline stage contributes to overall progress.
pub mod weight {
    /// Key derivation is by far the most CPU-expensive stage.
    pub const KEY_DERIVATION: u8 = 60;
    /// Bulk (de/en)cryption of the payload.
    pub const CIPHER: u8 = 30;
    /// Parsing or packing the group/entry records.
    pub const CODEC: u8 = 10;
}

/// Cooperative cancellation was requested and honored.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation was cancelled")]
pub struct Cancelled;

/// A handle for observing completion and requesting cancellation of a
/// `load`/`save` pipeline.
#[derive(Debug, Default)]
pub struct Progress {
    percent: AtomicU8,
    phase_complete: AtomicU8,
    cancel_requested: AtomicBool,
}

impl Progress {
    /// Create a fresh, non-cancelled handle at 0%.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread at any time.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel()` has been called.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Poll for cancellation; returns `Err(Cancelled)` if requested.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancel_requested() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Current completion percentage, 0-100.
    pub fn percent_complete(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }

    /// Mark a whole stage (identified by its weight) as complete, advancing
    /// the overall percentage by `stage_weight`.
    pub(crate) fn advance_stage(&self, stage_weight: u8) {
        let done = self.phase_complete.fetch_add(stage_weight, Ordering::SeqCst) + stage_weight;
        self.percent.store(done.min(100), Ordering::SeqCst);
    }

    /// Report fractional progress (0.0-1.0) within a stage of the given weight,
    /// without double-counting already-completed stages.
    pub(crate) fn report_fraction(&self, base: u8, stage_weight: u8, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let within = (stage_weight as f64 * fraction).round() as u8;
        self.percent.store((base + within).min(100), Ordering::SeqCst);
    }
}
