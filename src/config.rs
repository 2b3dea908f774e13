//! Configuration for creating a new database from scratch.

use crate::header::OuterCipher;

/// KDF round count used for new databases when the caller doesn't pick one:
/// enough to take a noticeable fraction of a second on typical hardware.
pub const DEFAULT_TRANSFORM_ROUNDS: u32 = 6_000;

/// Settings for a database created from scratch rather than loaded from a
/// file. The v1 format leaves little to configure: no compression, no
/// choice of inner-stream cipher, no KDF beyond AES rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Which cipher protects the payload.
    pub outer_cipher: OuterCipher,
    /// Number of AES rounds the key derivation runs.
    pub transform_rounds: u32,
}

/// AES-256, [`DEFAULT_TRANSFORM_ROUNDS`] rounds.
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { outer_cipher: OuterCipher::Aes256, transform_rounds: DEFAULT_TRANSFORM_ROUNDS }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_aes256() {
        let config = DatabaseConfig::default();
        assert_eq!(config.outer_cipher, OuterCipher::Aes256);
        assert_eq!(config.transform_rounds, DEFAULT_TRANSFORM_ROUNDS);
    }
}
