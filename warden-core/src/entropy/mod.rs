//! Entropy sources for challenges and handshake state tokens.
//!
//! Every challenge byte and every handshake state token is drawn from an
//! [`EntropySource`]. Production code uses [`OsEntropy`]; tests plug in
//! [`MockEntropy`] to get reproducible payloads.
//!
//! ```
//! use warden_core::entropy::{EntropySource, MockEntropy};
//!
//! let source = MockEntropy::default();
//! let first = source.get_entropy().unwrap();
//! let second = source.get_entropy().unwrap();
//! assert_ne!(first, second);
//! ```

mod mock;
mod os;

pub use mock::MockEntropy;
pub use os::OsEntropy;

use crate::error::Result;

/// Number of entropy bytes handed out per draw (256 bits).
pub const ENTROPY_BYTES: usize = 32;

/// Trait for entropy sources.
///
/// Implementations must be thread-safe (`Send + Sync`) since a single source
/// is shared by every request handler.
pub trait EntropySource: Send + Sync {
    /// Draw 256 bits of fresh entropy.
    fn get_entropy(&self) -> Result<[u8; ENTROPY_BYTES]>;

    /// Identifies where the bytes came from, for logging.
    fn source_id(&self) -> EntropyOrigin;

    /// Hex-encoded random token, used for handshake state parameters.
    fn token(&self) -> Result<String> {
        Ok(hex::encode(self.get_entropy()?))
    }
}

/// Identifies the entropy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EntropyOrigin {
    /// Operating system CSPRNG
    Os,
    /// Deterministic source for tests only
    Mock,
}

impl std::fmt::Display for EntropyOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Os => write!(f, "OS CSPRNG"),
            Self::Mock => write!(f, "Mock (NOT RANDOM)"),
        }
    }
}
