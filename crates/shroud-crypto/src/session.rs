//! Per-connection cipher state.
//!
//! A [`CipherSession`] carries everything a streamed transform advances
//! between calls: the salt or IV, the derived subkey, the running nonce and
//! counter, the keyed transform and a working buffer for partial input. It
//! is created by [`crate::Crypto::ctx_init`] for exactly one direction and
//! one method, and must be owned by a single connection.

use crate::aead::AeadTransform;
use crate::buffer::ByteBuffer;
use crate::crypto::CipherMethod;
use crate::stream::Keystream;
use crate::{CryptoError, MAX_KEY_LENGTH, MAX_NONCE_LENGTH};
use zeroize::Zeroize;

/// Which way a session transforms data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext in, ciphertext out
    Encrypt,
    /// Ciphertext in, plaintext out
    Decrypt,
}

/// Outcome of a streamed operation that did not fail.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// The buffer holds output ready to forward
    Ready,
    /// An incomplete unit was supplied; call again once more bytes arrive
    NeedMore,
}

impl Flow {
    /// Whether output is ready.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Keyed transform held by a session.
pub(crate) enum Transform {
    /// Not keyed yet (decrypt side before the salt arrives, or released)
    Empty,
    /// Stream-cipher keystream
    Stream(Box<dyn Keystream>),
    /// Keyed AEAD
    Aead(AeadTransform),
}

/// Per-connection mutable cipher state.
pub struct CipherSession {
    /// Salt/IV has been written (encrypt) or consumed (decrypt)
    pub(crate) init: bool,
    /// Stream: payload bytes processed. AEAD: seal/open operations performed.
    pub(crate) counter: u64,
    pub(crate) direction: Direction,
    pub(crate) method: CipherMethod,
    pub(crate) transform: Transform,
    /// Working storage for partial input
    pub(crate) chunk: ByteBuffer,
    pub(crate) salt: [u8; MAX_KEY_LENGTH],
    /// Valid bytes in `salt`; zero until known
    pub(crate) salt_len: usize,
    pub(crate) subkey: [u8; MAX_KEY_LENGTH],
    pub(crate) nonce: [u8; MAX_NONCE_LENGTH],
}

impl CipherSession {
    pub(crate) fn new(method: CipherMethod, direction: Direction) -> Self {
        Self {
            init: false,
            counter: 0,
            direction,
            method,
            transform: Transform::Empty,
            chunk: ByteBuffer::new(),
            salt: [0u8; MAX_KEY_LENGTH],
            salt_len: 0,
            subkey: [0u8; MAX_KEY_LENGTH],
            nonce: [0u8; MAX_NONCE_LENGTH],
        }
    }

    /// Fail unless this session was created for `method` in `direction`.
    pub(crate) fn ensure_bound(
        &self,
        method: CipherMethod,
        direction: Direction,
    ) -> Result<(), CryptoError> {
        if self.method != method || self.direction != direction {
            return Err(CryptoError::InvalidState);
        }
        Ok(())
    }

    pub(crate) fn set_salt(&mut self, salt: &[u8]) {
        self.salt[..salt.len()].copy_from_slice(salt);
        self.salt_len = salt.len();
    }

    /// Zeroize key material and return to the unkeyed state.
    pub(crate) fn reset(&mut self) {
        self.init = false;
        self.counter = 0;
        self.transform = Transform::Empty;
        self.chunk.release();
        self.salt.zeroize();
        self.salt_len = 0;
        self.subkey.zeroize();
        self.nonce.zeroize();
    }

    /// Direction fixed at creation.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Method this session is bound to.
    #[must_use]
    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// Whether the salt/IV has been sent or received.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.init
    }

    /// Running counter (see field docs for units per family).
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// The session salt (AEAD) or IV (stream), once known.
    ///
    /// On the decrypt side this becomes available after the first streamed
    /// `decrypt` that receives the complete salt; the session layer checks it
    /// against the replay filter at that point.
    #[must_use]
    pub fn salt(&self) -> Option<&[u8]> {
        (self.salt_len > 0).then(|| &self.salt[..self.salt_len])
    }

    /// Bytes held back waiting for the rest of a unit.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.chunk.len()
    }
}

impl Drop for CipherSession {
    fn drop(&mut self) {
        self.salt.zeroize();
        self.subkey.zeroize();
        self.nonce.zeroize();
    }
}

impl std::fmt::Debug for CipherSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSession")
            .field("method", &self.method.name())
            .field("direction", &self.direction)
            .field("init", &self.init)
            .field("counter", &self.counter)
            .field("pending", &self.chunk.len())
            .finish_non_exhaustive()
    }
}
