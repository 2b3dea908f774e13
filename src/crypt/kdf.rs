//! The KDB key derivation function: N rounds of AES-256-ECB over the composite
//! key, keyed by the header's transform seed, finalized with SHA-256.

use aes::Aes256;
use cipher::{array::Array as GenericArray, BlockCipherEncrypt, KeyInit};
use sha2::{Digest, Sha256};

use crate::progress::{Cancelled, Progress};

/// How many rounds to run between progress-percentage updates. Cancellation
/// itself is still polled every round (the spec's latency bound is one round),
/// but recomputing and publishing the percentage that often would be wasted work.
const PROGRESS_INTERVAL: u64 = 2048;

/// Run the AES-rounds transform over a 32-byte composite key, reporting
/// fractional progress and honoring cooperative cancellation.
///
/// The composite key is split into two 16-byte halves that are put through
/// `rounds` independent single-block AES-ECB encryptions keyed by `seed`,
/// then concatenated and hashed with SHA-256.
pub(crate) fn transform_key(
    composite_key: &[u8; 32],
    seed: &[u8; 32],
    rounds: u64,
    progress: &Progress,
    progress_base: u8,
    progress_weight: u8,
) -> Result<[u8; 32], Cancelled> {
    let cipher = Aes256::new(&GenericArray::try_from(seed.as_slice()).unwrap());
    let mut block1 = GenericArray::try_from(&composite_key[..16]).unwrap();
    let mut block2 = GenericArray::try_from(&composite_key[16..]).unwrap();

    let mut round = 0u64;
    while round < rounds {
        progress.check_cancelled()?;

        cipher.encrypt_block(&mut block1);
        cipher.encrypt_block(&mut block2);
        round += 1;

        if round % PROGRESS_INTERVAL == 0 || round == rounds {
            progress.report_fraction(progress_base, progress_weight, round as f64 / rounds as f64);
        }
    }

    let mut digest = Sha256::new();
    digest.update(block1);
    digest.update(block2);
    Ok(digest.finalize().into())
}
