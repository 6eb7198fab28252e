//! Mock entropy for testing.

use std::sync::atomic::{AtomicU64, Ordering};

use sha3::{Digest, Sha3_256};

use super::{EntropyOrigin, EntropySource, ENTROPY_BYTES};
use crate::error::Result;

/// Deterministic entropy for tests.
/// WARNING: Do not use in production - output is predictable from the seed!
///
/// Each draw hashes the seed together with a draw counter, so consecutive
/// draws differ while a fresh instance with the same seed replays the same
/// sequence.
pub struct MockEntropy {
    seed: u64,
    counter: AtomicU64,
}

impl MockEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
        }
    }

    /// Create a mock with default seed for simple tests.
    pub fn default_test() -> Self {
        Self::new(0xDEADBEEF_CAFEBABE)
    }

    /// Number of draws made so far.
    pub fn draws(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for MockEntropy {
    fn default() -> Self {
        Self::default_test()
    }
}

impl EntropySource for MockEntropy {
    fn get_entropy(&self) -> Result<[u8; ENTROPY_BYTES]> {
        let draw = self.counter.fetch_add(1, Ordering::SeqCst);

        let mut hasher = Sha3_256::new();
        hasher.update(self.seed.to_le_bytes());
        hasher.update(draw.to_le_bytes());
        hasher.update(b"warden-mock-entropy");

        let result = hasher.finalize();
        let mut entropy = [0u8; ENTROPY_BYTES];
        entropy.copy_from_slice(&result);
        Ok(entropy)
    }

    fn source_id(&self) -> EntropyOrigin {
        EntropyOrigin::Mock
    }
}
