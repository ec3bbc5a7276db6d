//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Method name is not in either supported cipher list
    #[error("unsupported cipher method: {0}")]
    UnsupportedMethod(String),

    /// Invalid construction parameter (empty password, bad sizes)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid key length for the underlying primitive
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Malformed ciphertext framing
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Session used with the wrong cipher, or in the wrong direction
    #[error("invalid state for operation")]
    InvalidState,

    /// Nonce overflow (counter exhausted)
    #[error("nonce counter exhausted, session must be re-established")]
    NonceOverflow,

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Replay filter could not be constructed
    #[error("replay filter initialization failed: {0}")]
    ReplayFilterInit(String),
}

impl CryptoError {
    /// Whether the process must stop serving connections.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RandomFailed | Self::ReplayFilterInit(_))
    }

    /// Whether this is a construction-time configuration failure.
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMethod(_) | Self::InvalidParameter(_) | Self::InvalidKeyLength { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(CryptoError::RandomFailed.is_fatal());
        assert!(CryptoError::ReplayFilterInit("zero entries".into()).is_fatal());
        assert!(!CryptoError::DecryptionFailed.is_fatal());

        assert!(CryptoError::UnsupportedMethod("rot13".into()).is_config());
        assert!(
            CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            }
            .is_config()
        );
        assert!(!CryptoError::InvalidState.is_config());
    }

    #[test]
    fn test_error_display() {
        let err = CryptoError::UnsupportedMethod("AES-256-GCM".into());
        assert_eq!(err.to_string(), "unsupported cipher method: AES-256-GCM");
    }
}
