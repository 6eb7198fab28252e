//! Operating system entropy.

use super::{EntropyOrigin, EntropySource, ENTROPY_BYTES};
use crate::error::{AuthError, Result};

/// Entropy from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn get_entropy(&self) -> Result<[u8; ENTROPY_BYTES]> {
        let mut buf = [0u8; ENTROPY_BYTES];
        getrandom::fill(&mut buf).map_err(|e| AuthError::EntropyError(e.to_string()))?;
        Ok(buf)
    }

    fn source_id(&self) -> EntropyOrigin {
        EntropyOrigin::Os
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_entropy_differs_between_draws() {
        let source = OsEntropy;
        let a = source.get_entropy().unwrap();
        let b = source.get_entropy().unwrap();
        assert_ne!(a, b);
        assert_eq!(source.source_id(), EntropyOrigin::Os);
    }

    #[test]
    fn test_token_is_hex() {
        let token = OsEntropy.token().unwrap();
        assert_eq!(token.len(), ENTROPY_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
