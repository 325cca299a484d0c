use super::EncryptionError;

/// Source of the random bytes the security handler needs: the document identifier, the
/// initialization vector of every AES-encrypted string or stream, and a synthesized owner password
/// when none is supplied.
///
/// Implementations must be cryptographically secure outside of tests and safe to share between
/// threads, as objects may be encrypted in parallel.
pub trait RandomSource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), EncryptionError>;
}

/// The operating system's random number generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), EncryptionError> {
        getrandom::fill(dest).map_err(|err| EncryptionError::RandomSourceUnavailable(err.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    /// Deterministic byte counter, so that IVs and synthesized passwords are reproducible.
    #[derive(Debug, Default)]
    pub(crate) struct CountingRandom(AtomicU8);

    impl RandomSource for CountingRandom {
        fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), EncryptionError> {
            for byte in dest {
                *byte = self.0.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    pub(crate) struct BrokenRandom;

    impl RandomSource for BrokenRandom {
        fn fill_bytes(&self, _dest: &mut [u8]) -> Result<(), EncryptionError> {
            Err(EncryptionError::RandomSourceUnavailable("entropy pool closed".into()))
        }
    }

    #[test]
    fn os_random_fills_the_buffer() {
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];

        OsRandom.fill_bytes(&mut first).unwrap();
        OsRandom.fill_bytes(&mut second).unwrap();

        assert_ne!(first, second);
    }
}
