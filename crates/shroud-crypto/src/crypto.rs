//! Cipher construction and dispatch.
//!
//! A method name selects one of two families:
//!
//! | Family | Framing | Tag |
//! |--------|---------|-----|
//! | Stream | `IV ‖ keystream ⊕ data` | none |
//! | AEAD   | `salt ‖ [len+tag][payload+tag]…` | 16 bytes |
//!
//! [`Crypto::new`] binds exactly one family's implementation of
//! [`CipherOps`]. Every operation on the handle goes to that implementation,
//! so stream and AEAD operations can never be mixed on one handle, and a
//! [`CipherSession`] created by one method is rejected by any other.

use crate::aead::{AEAD_CIPHERS, AeadCipher, AeadMethod};
use crate::buffer::ByteBuffer;
use crate::config::CryptoConfig;
use crate::session::{CipherSession, Direction, Flow};
use crate::stream::{STREAM_CIPHERS, StreamCipher, StreamMethod};
use crate::{CryptoError, MAX_KEY_LENGTH};
use zeroize::ZeroizeOnDrop;

/// Cipher family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherFamily {
    /// Whole-stream keystream ciphers, no authentication
    Stream,
    /// Authenticated encryption with associated data
    Aead,
}

/// A supported method from either family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherMethod {
    /// Stream-cipher method
    Stream(StreamMethod),
    /// AEAD method
    Aead(AeadMethod),
}

impl CipherMethod {
    /// Look up a method by its exact (case-sensitive) name.
    ///
    /// The stream list is searched before the AEAD list.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        StreamMethod::from_name(name)
            .map(Self::Stream)
            .or_else(|| AeadMethod::from_name(name).map(Self::Aead))
    }

    /// Canonical method name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Stream(m) => m.name(),
            Self::Aead(m) => m.name(),
        }
    }

    /// Family the method belongs to.
    #[must_use]
    pub fn family(self) -> CipherFamily {
        match self {
            Self::Stream(_) => CipherFamily::Stream,
            Self::Aead(_) => CipherFamily::Aead,
        }
    }
}

impl std::fmt::Display for CipherMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable per-password, per-method cipher parameters.
///
/// Safe to share across any number of concurrent sessions.
#[derive(Clone, ZeroizeOnDrop)]
pub struct CipherDescriptor {
    #[zeroize(skip)]
    method: CipherMethod,
    #[zeroize(skip)]
    nonce_len: usize,
    #[zeroize(skip)]
    key_len: usize,
    #[zeroize(skip)]
    tag_len: usize,
    /// Master key derived from the password
    key: [u8; MAX_KEY_LENGTH],
}

impl CipherDescriptor {
    pub(crate) fn new(
        method: CipherMethod,
        nonce_len: usize,
        key_len: usize,
        tag_len: usize,
        key: [u8; MAX_KEY_LENGTH],
    ) -> Self {
        Self {
            method,
            nonce_len,
            key_len,
            tag_len,
            key,
        }
    }

    /// Method this descriptor was built for.
    #[must_use]
    pub fn method(&self) -> CipherMethod {
        self.method
    }

    /// IV length (stream) or AEAD nonce length.
    #[must_use]
    pub fn nonce_len(&self) -> usize {
        self.nonce_len
    }

    /// Key length.
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Authentication tag length, zero for stream methods.
    #[must_use]
    pub fn tag_len(&self) -> usize {
        self.tag_len
    }

    /// Master key bytes.
    ///
    /// # Security
    ///
    /// Exposes raw key material.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key[..self.key_len]
    }
}

impl std::fmt::Debug for CipherDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherDescriptor")
            .field("method", &self.method.name())
            .field("nonce_len", &self.nonce_len)
            .field("key_len", &self.key_len)
            .field("tag_len", &self.tag_len)
            .finish_non_exhaustive()
    }
}

/// The six operations every cipher family provides.
///
/// Whole-buffer operations (`encrypt_all`, `decrypt_all`) frame a single
/// self-contained datagram and keep no state. Streamed operations
/// (`encrypt`, `decrypt`) advance a [`CipherSession`] and may report
/// [`Flow::NeedMore`] when only part of a unit has arrived. Mixing the two
/// modes on one session is not possible: whole-buffer operations never take
/// a session.
///
/// `capacity` is a minimum capacity hint for the output buffer.
pub trait CipherOps: Send + Sync {
    /// Immutable parameters shared by every session.
    fn descriptor(&self) -> &CipherDescriptor;

    /// Encrypt a complete datagram in place.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if no salt could be drawn, or
    /// [`CryptoError::EncryptionFailed`] if the transform fails.
    fn encrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError>;

    /// Decrypt a complete datagram in place.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidMessage`] for truncated input and
    /// [`CryptoError::DecryptionFailed`] on authentication failure.
    fn decrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError>;

    /// Encrypt the next piece of a stream in place.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] if the session belongs to another
    /// method or direction.
    fn encrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError>;

    /// Decrypt the next piece of a stream in place.
    ///
    /// Incomplete trailing input is kept in the session and `buf` receives
    /// only complete plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidState`] for a foreign session and
    /// [`CryptoError::DecryptionFailed`] or [`CryptoError::InvalidMessage`]
    /// for corrupt input. The connection must be dropped on error.
    fn decrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError>;

    /// Create a session for one direction of a connection.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the encrypt-side salt cannot
    /// be drawn.
    fn ctx_init(&self, direction: Direction) -> Result<CipherSession, CryptoError>;

    /// Zeroize and reset a session. Safe to call repeatedly.
    fn ctx_release(&self, session: &mut CipherSession);
}

/// A bound cipher handle: one descriptor and one family's operations.
///
/// `Crypto` is `Send + Sync`; a server typically builds one per configured
/// password and method and shares it through an `Arc`.
pub struct Crypto {
    ops: Box<dyn CipherOps>,
}

impl Crypto {
    /// Build a handle for `method`, deriving the key from `password`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedMethod`] if `method` is not an exact
    /// name from [`STREAM_CIPHERS`] or [`AEAD_CIPHERS`], or the family
    /// constructor's error (for example an empty password).
    pub fn new(password: &str, method: &str) -> Result<Self, CryptoError> {
        let rejected =
            |e: &CryptoError| tracing::error!(method, error = %e, "cipher construction failed");

        let ops: Box<dyn CipherOps> = match CipherMethod::from_name(method) {
            Some(CipherMethod::Stream(m)) => {
                Box::new(StreamCipher::new(password, m).inspect_err(rejected)?)
            }
            Some(CipherMethod::Aead(m)) => {
                Box::new(AeadCipher::new(password, m).inspect_err(rejected)?)
            }
            None => {
                tracing::error!(method, "invalid cipher name");
                return Err(CryptoError::UnsupportedMethod(method.to_owned()));
            }
        };

        tracing::debug!(
            method,
            family = ?ops.descriptor().method().family(),
            "cipher bound"
        );
        Ok(Self { ops })
    }

    /// Build a handle from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedMethod`] when no method is
    /// configured, otherwise as [`Crypto::new`].
    pub fn from_config(config: &CryptoConfig) -> Result<Self, CryptoError> {
        match config.method.as_deref() {
            Some(method) => Self::new(&config.password, method),
            None => {
                tracing::error!("no cipher method configured");
                Err(CryptoError::UnsupportedMethod("<none>".into()))
            }
        }
    }

    /// Shared cipher parameters.
    #[must_use]
    pub fn descriptor(&self) -> &CipherDescriptor {
        self.ops.descriptor()
    }

    /// Bound method.
    #[must_use]
    pub fn method(&self) -> CipherMethod {
        self.descriptor().method()
    }

    /// Bound family.
    #[must_use]
    pub fn family(&self) -> CipherFamily {
        self.method().family()
    }

    /// Tag length, zero for stream methods.
    #[must_use]
    pub fn tag_len(&self) -> usize {
        self.descriptor().tag_len()
    }

    /// IV or nonce length.
    #[must_use]
    pub fn nonce_len(&self) -> usize {
        self.descriptor().nonce_len()
    }

    /// Key length.
    #[must_use]
    pub fn key_len(&self) -> usize {
        self.descriptor().key_len()
    }

    /// See [`CipherOps::encrypt_all`].
    ///
    /// # Errors
    ///
    /// As [`CipherOps::encrypt_all`].
    pub fn encrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError> {
        self.ops.encrypt_all(buf, capacity)
    }

    /// See [`CipherOps::decrypt_all`].
    ///
    /// # Errors
    ///
    /// As [`CipherOps::decrypt_all`].
    pub fn decrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError> {
        self.ops.decrypt_all(buf, capacity)
    }

    /// See [`CipherOps::encrypt`].
    ///
    /// # Errors
    ///
    /// As [`CipherOps::encrypt`].
    pub fn encrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError> {
        self.ops.encrypt(buf, session, capacity)
    }

    /// See [`CipherOps::decrypt`].
    ///
    /// # Errors
    ///
    /// As [`CipherOps::decrypt`].
    pub fn decrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError> {
        self.ops.decrypt(buf, session, capacity)
    }

    /// See [`CipherOps::ctx_init`].
    ///
    /// # Errors
    ///
    /// As [`CipherOps::ctx_init`].
    pub fn ctx_init(&self, direction: Direction) -> Result<CipherSession, CryptoError> {
        self.ops.ctx_init(direction)
    }

    /// See [`CipherOps::ctx_release`].
    pub fn ctx_release(&self, session: &mut CipherSession) {
        self.ops.ctx_release(session);
    }
}

impl std::fmt::Debug for Crypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crypto")
            .field("descriptor", self.descriptor())
            .finish()
    }
}

/// Every supported method name, stream family first.
pub fn supported_methods() -> impl Iterator<Item = &'static str> {
    STREAM_CIPHERS.iter().chain(AEAD_CIPHERS.iter()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_construct_aead() {
        let crypto = Crypto::new("pw123", "aes-256-gcm").unwrap();
        assert_eq!(crypto.family(), CipherFamily::Aead);
        assert!(crypto.tag_len() > 0);
        assert_eq!(crypto.key_len(), 32);
    }

    #[test]
    fn test_construct_stream() {
        let crypto = Crypto::new("pw123", "chacha20-ietf").unwrap();
        assert_eq!(crypto.family(), CipherFamily::Stream);
        assert_eq!(crypto.tag_len(), 0);
        assert_eq!(crypto.nonce_len(), 12);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = Crypto::new("pw123", "not-a-real-cipher").unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedMethod(ref m) if m == "not-a-real-cipher"));
        assert!(err.is_config());
    }

    #[test]
    fn test_method_match_is_exact() {
        for bad in ["", "AES-256-GCM", "aes-256-gc", "aes-256-gcm ", " aes-256-gcm", "aes"] {
            assert!(
                matches!(
                    Crypto::new("pw", bad),
                    Err(CryptoError::UnsupportedMethod(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_every_listed_method_constructs() {
        for name in supported_methods() {
            let crypto = Crypto::new("password", name)
                .unwrap_or_else(|e| panic!("{name} failed to construct: {e}"));
            assert_eq!(crypto.method().name(), name);
        }
    }

    #[test]
    fn test_empty_password_rejected() {
        assert!(matches!(
            Crypto::new("", "aes-128-gcm"),
            Err(CryptoError::InvalidParameter(_))
        ));
        assert!(matches!(
            Crypto::new("", "aes-128-ctr"),
            Err(CryptoError::InvalidParameter(_))
        ));
    }

    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogSink {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a subscriber that records error-level events.
    fn errors_logged(f: impl FnOnce()) -> String {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let sink = Arc::clone(&sink);
            move || LogSink(Arc::clone(&sink))
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        let logged = sink.lock().clone();
        String::from_utf8(logged).unwrap()
    }

    #[test]
    fn test_constructor_failure_logged() {
        for method in ["aes-128-gcm", "salsa20"] {
            let logged = errors_logged(|| assert!(Crypto::new("", method).is_err()));
            assert!(logged.contains("cipher construction failed"), "{logged}");
            assert!(logged.contains(method), "{logged}");
        }

        let logged = errors_logged(|| assert!(Crypto::new("pw", "rot13").is_err()));
        assert!(logged.contains("invalid cipher name"), "{logged}");

        let logged = errors_logged(|| assert!(Crypto::new("pw", "aes-128-gcm").is_ok()));
        assert!(logged.is_empty(), "{logged}");
    }

    #[test]
    fn test_from_config_without_method() {
        let config = CryptoConfig {
            method: None,
            ..CryptoConfig::default()
        };
        assert!(matches!(
            Crypto::from_config(&config),
            Err(CryptoError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_session_bound_to_method() {
        let gcm = Crypto::new("pw", "aes-256-gcm").unwrap();
        let chacha = Crypto::new("pw", "chacha20-ietf-poly1305").unwrap();
        let ctr = Crypto::new("pw", "aes-256-ctr").unwrap();

        let mut session = gcm.ctx_init(Direction::Encrypt).unwrap();
        let mut buf = ByteBuffer::from(&b"data"[..]);

        assert!(matches!(
            chacha.encrypt(&mut buf, &mut session, 0),
            Err(CryptoError::InvalidState)
        ));
        assert!(matches!(
            ctr.encrypt(&mut buf, &mut session, 0),
            Err(CryptoError::InvalidState)
        ));
        // Wrong direction on the right handle
        assert!(matches!(
            gcm.decrypt(&mut buf, &mut session, 0),
            Err(CryptoError::InvalidState)
        ));
        assert_eq!(buf.as_slice(), b"data");
    }

    #[test]
    fn test_descriptor_debug_hides_key() {
        let crypto = Crypto::new("pw123", "aes-128-gcm").unwrap();
        let shown = format!("{crypto:?}");
        assert!(shown.contains("aes-128-gcm"));
        assert!(!shown.contains("key:"));
    }

    #[test]
    fn test_handle_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Crypto>();
        assert_send_sync::<CipherDescriptor>();
    }
}
