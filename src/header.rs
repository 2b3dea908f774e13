//! The fixed 124-byte KDB v1 header: signatures, flags, seeds, IVs, counts and
//! the content hash.

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{HeaderError, RngError};

/// First magic signature word, identifying any KeePass database.
pub const SIGNATURE_1: u32 = 0x9AA2_D903;
/// Second magic signature word, identifying the KDB v1 (vs KDBX2+) format.
pub const SIGNATURE_2: u32 = 0xB54B_FB65;

/// Flag bit selecting AES-256 as the outer cipher.
pub const FLAG_AES: u32 = 1 << 1;
/// Flag bit selecting Twofish as the outer cipher.
pub const FLAG_TWOFISH: u32 = 1 << 3;

/// The version value (after masking off the low byte) every supported file must carry.
pub const VERSION: u32 = 0x0003_0004;
const VERSION_MASK: u32 = 0xFFFF_FF00;

/// Size in bytes of the fixed header; the ciphertext payload begins right after it.
pub const HEADER_SIZE: usize = 124;

/// Which symmetric cipher protects the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterCipher {
    /// AES-256-CBC
    Aes256,
    /// Twofish-256-CBC
    Twofish,
}

/// The fixed-layout KDB v1 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Which outer cipher protects the payload.
    pub cipher: OuterCipher,
    /// Random per-file seed mixed into the master key.
    pub master_seed: [u8; 16],
    /// CBC initialization vector for the outer cipher.
    pub encryption_iv: [u8; 16],
    /// Number of non-synthetic groups in the serialized payload.
    pub num_groups: u32,
    /// Number of entries (including meta-streams) in the serialized payload.
    pub num_entries: u32,
    /// SHA-256 of the decrypted, serialized payload.
    pub content_hash: [u8; 32],
    /// Random per-file seed keying the KDF's AES rounds.
    pub transform_seed: [u8; 32],
    /// Number of KDF rounds to run.
    pub transform_rounds: u32,
}

/// Inspect only the first 12 bytes to decide whether `data` looks like a KDB v1 file,
/// without validating the rest of the header.
pub fn is_signature_match(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let mut r = ByteReader::new(&data[..12]);
    let sig1 = r.read_u32();
    let sig2 = r.read_u32();
    let flags = r.read_u32();
    matches!((sig1, sig2, flags), (Ok(SIGNATURE_1), Ok(SIGNATURE_2), Ok(_)))
}

impl Header {
    /// Parse the fixed header from the start of a `.kdb` file.
    pub fn read(data: &[u8]) -> Result<Header, HeaderError> {
        if data.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated { size: data.len() });
        }

        let mut r = ByteReader::new(&data[..HEADER_SIZE]);
        // the reader primitives are infallible here because we already checked the length
        #[allow(clippy::unwrap_used)]
        let sig1 = r.read_u32().unwrap();
        #[allow(clippy::unwrap_used)]
        let sig2 = r.read_u32().unwrap();
        if sig1 != SIGNATURE_1 || sig2 != SIGNATURE_2 {
            return Err(HeaderError::BadSignature);
        }

        #[allow(clippy::unwrap_used)]
        let flags = r.read_u32().unwrap();
        #[allow(clippy::unwrap_used)]
        let version = r.read_u32().unwrap();
        if version & VERSION_MASK != VERSION {
            return Err(HeaderError::BadVersion { version });
        }

        let cipher = match (flags & FLAG_AES != 0, flags & FLAG_TWOFISH != 0) {
            (true, false) => OuterCipher::Aes256,
            (false, true) => OuterCipher::Twofish,
            _ => return Err(HeaderError::BadCipherFlags { flags }),
        };

        #[allow(clippy::unwrap_used)]
        let master_seed = r.read_blob(16).unwrap().try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let encryption_iv = r.read_blob(16).unwrap().try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let num_groups = r.read_u32().unwrap();
        #[allow(clippy::unwrap_used)]
        let num_entries = r.read_u32().unwrap();
        #[allow(clippy::unwrap_used)]
        let content_hash = r.read_blob(32).unwrap().try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let transform_seed = r.read_blob(32).unwrap().try_into().unwrap();
        #[allow(clippy::unwrap_used)]
        let transform_rounds = r.read_u32().unwrap();

        Ok(Header {
            cipher,
            master_seed,
            encryption_iv,
            num_groups,
            num_entries,
            content_hash,
            transform_seed,
            transform_rounds,
        })
    }

    /// Emit the header in its fixed 124-byte wire layout.
    pub fn write(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u32(SIGNATURE_1);
        w.write_u32(SIGNATURE_2);
        w.write_u32(match self.cipher {
            OuterCipher::Aes256 => FLAG_AES,
            OuterCipher::Twofish => FLAG_TWOFISH,
        });
        w.write_u32(VERSION);
        w.write_blob(&self.master_seed);
        w.write_blob(&self.encryption_iv);
        w.write_u32(self.num_groups);
        w.write_u32(self.num_entries);
        w.write_blob(&self.content_hash);
        w.write_blob(&self.transform_seed);
        w.write_u32(self.transform_rounds);

        let bytes = w.into_bytes();
        debug_assert_eq!(bytes.len(), HEADER_SIZE);
        bytes
    }

    /// Fill the master seed, IV and transform seed with fresh randomness.
    pub fn randomize_seeds(&mut self) -> Result<(), RngError> {
        getrandom::fill(&mut self.master_seed)?;
        getrandom::fill(&mut self.encryption_iv)?;
        getrandom::fill(&mut self.transform_seed)?;
        Ok(())
    }
}
