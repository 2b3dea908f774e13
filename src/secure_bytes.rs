//! A byte buffer that is explicitly zeroed on drop and never implicitly cloned.
//!
//! Composite keys, master keys and intermediate KDF buffers flow through
//! [`SecureBytes`] rather than plain `Vec<u8>`, so that a failed `load`, a
//! cancelled KDF round, or simply dropping a `Database` all leave no
//! recoverable copy of key material on the heap.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A heap buffer that zeroes its contents when dropped.
///
/// Deliberately does not implement `Clone`: callers that need another copy
/// of the secret must say so explicitly via [`SecureBytes::duplicate`],
/// rather than acquiring one by accident through a derive.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    /// Take ownership of `data`, which the caller must not keep another copy of.
    pub fn new(data: Vec<u8>) -> Self {
        SecureBytes(data)
    }

    /// Borrow the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Explicitly make another zeroizing copy of this secret.
    pub fn duplicate(&self) -> Self {
        SecureBytes(self.0.clone())
    }
}

impl std::fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureBytes(<redacted>)")
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(data: Vec<u8>) -> Self {
        SecureBytes(data)
    }
}

impl PartialEq for SecureBytes {
    fn eq(&self, other: &Self) -> bool {
        // constant-time-ish enough for our purposes: this crate uses it for
        // composite-key comparisons in tests, not for timing-sensitive auth checks.
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_is_redacted() {
        let s = SecureBytes::new(vec![1, 2, 3]);
        assert_eq!(format!("{:?}", s), "SecureBytes(<redacted>)");
    }

    #[test]
    fn duplicate_is_independent() {
        let s = SecureBytes::new(vec![1, 2, 3]);
        let d = s.duplicate();
        assert_eq!(s, d);
    }
}
