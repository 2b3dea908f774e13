//! Symmetric cipher and hashing primitives used to decrypt and encrypt a KDB payload.

pub(crate) mod ciphers;
pub(crate) mod kdf;

use sha2::{Digest, Sha256};

/// SHA-256 over the concatenation of `elements`.
pub(crate) fn calculate_sha256(elements: &[&[u8]]) -> [u8; 32] {
    let mut digest = Sha256::new();
    for element in elements {
        digest.update(element);
    }
    digest.finalize().into()
}
