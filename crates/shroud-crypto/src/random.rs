//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the underlying OS CSPRNG fails.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Check that the OS CSPRNG is usable before serving connections.
///
/// Draws a small sample and rejects an all-zero result, which no working
/// generator produces in practice.
///
/// # Errors
///
/// Returns [`CryptoError::RandomFailed`] if the generator fails or is stuck.
pub fn probe() -> Result<(), CryptoError> {
    let mut sample = [0u8; 32];
    fill_random(&mut sample)?;
    if sample.iter().all(|&b| b == 0) {
        return Err(CryptoError::RandomFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_random_changes_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        fill_random(&mut a).unwrap();
        fill_random(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fill_random_empty() {
        let mut empty: [u8; 0] = [];
        assert!(fill_random(&mut empty).is_ok());
    }

    #[test]
    fn test_probe() {
        assert!(probe().is_ok());
    }
}
