//! Assembling the composite key from a password and/or key-file, the input
//! to the KDF in [`crate::crypt::kdf`].

use crate::crypt::calculate_sha256;
use crate::error::DatabaseKeyError;
use crate::secure_bytes::SecureBytes;

/// A password and/or key-file, not yet reduced to a composite key.
///
/// Mirrors the builder style of a database key object that accumulates key
/// material before it is hashed down; this format has no challenge-response
/// or XML key-file v2 support, only the two plain sources KDB v1 recognizes.
#[derive(Debug, Default)]
pub struct CompositeKey {
    password: Option<String>,
    keyfile: Option<Vec<u8>>,
}

impl CompositeKey {
    /// Start with no key material.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a password component.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_owned());
        self
    }

    /// Add a key-file component from its raw file contents.
    pub fn with_keyfile(mut self, keyfile: &[u8]) -> Self {
        self.keyfile = Some(keyfile.to_vec());
        self
    }

    /// True if neither a password nor a key-file has been supplied.
    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.keyfile.is_none()
    }

    /// Reduce the accumulated key material to the 32-byte composite key fed
    /// into the KDF: the SHA-256 of the concatenation of each component's own
    /// hash (password hashed directly; key-file reduced per
    /// [`reduce_keyfile`]).
    pub fn assemble(&self) -> Result<SecureBytes, DatabaseKeyError> {
        let mut elements: Vec<[u8; 32]> = Vec::new();

        if let Some(password) = &self.password {
            elements.push(calculate_sha256(&[password.as_bytes()]));
        }

        if let Some(keyfile) = &self.keyfile {
            elements.push(reduce_keyfile(keyfile));
        }

        if elements.is_empty() {
            return Err(DatabaseKeyError::EmptyKey);
        }

        let refs: Vec<&[u8]> = elements.iter().map(|e| e.as_slice()).collect();
        Ok(SecureBytes::from(calculate_sha256(&refs).to_vec()))
    }
}

/// Reduce a key-file's raw bytes to 32 bytes: a 32-byte file is used as-is
/// (the legacy binary key-file format), anything else is hashed with SHA-256.
fn reduce_keyfile(buffer: &[u8]) -> [u8; 32] {
    if buffer.len() == 32 {
        #[allow(clippy::unwrap_used)]
        buffer.try_into().unwrap()
    } else {
        calculate_sha256(&[buffer])
    }
}
