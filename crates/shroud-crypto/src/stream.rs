//! Stream-cipher method family.
//!
//! ## Framing
//!
//! - Streamed: the first encrypted piece of a connection is prefixed with a
//!   random IV; everything after is plaintext XORed with the keystream.
//! - Whole-buffer: each datagram is `IV ‖ keystream ⊕ payload` with a fresh
//!   IV.
//!
//! The key is the password run through [`bytes_to_key`] and is the same for
//! every session; the IV is what makes each session's keystream unique.
//! These methods carry no integrity protection.

use crate::buffer::ByteBuffer;
use crate::crypto::{CipherDescriptor, CipherMethod, CipherOps};
use crate::digest::bytes_to_key;
use crate::random::fill_random;
use crate::session::{CipherSession, Direction, Flow, Transform};
use crate::{CryptoError, MAX_KEY_LENGTH, MAX_NONCE_LENGTH};
use aes::cipher::{
    BlockCipher, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher as ApplyKeystream,
};
use aes::{Aes128, Aes192, Aes256};
use cfb_mode::{BufDecryptor, BufEncryptor};
use zeroize::Zeroizing;

/// Supported stream method names, in lookup order.
///
/// Index `i` names `StreamMethod::ALL[i]`.
pub const STREAM_CIPHERS: [&str; 9] = [
    "aes-128-cfb",
    "aes-192-cfb",
    "aes-256-cfb",
    "aes-128-ctr",
    "aes-192-ctr",
    "aes-256-ctr",
    "salsa20",
    "chacha20",
    "chacha20-ietf",
];

/// Stream-cipher methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMethod {
    /// AES-128 in 128-bit cipher feedback mode
    Aes128Cfb,
    /// AES-192 in 128-bit cipher feedback mode
    Aes192Cfb,
    /// AES-256 in 128-bit cipher feedback mode
    Aes256Cfb,
    /// AES-128 in big-endian counter mode
    Aes128Ctr,
    /// AES-192 in big-endian counter mode
    Aes192Ctr,
    /// AES-256 in big-endian counter mode
    Aes256Ctr,
    /// Salsa20/20 with a 64-bit nonce
    Salsa20,
    /// ChaCha20 with the original 64-bit nonce
    ChaCha20,
    /// ChaCha20 with the IETF 96-bit nonce
    ChaCha20Ietf,
}

impl StreamMethod {
    /// All methods, in the same order as [`STREAM_CIPHERS`].
    pub const ALL: [StreamMethod; 9] = [
        Self::Aes128Cfb,
        Self::Aes192Cfb,
        Self::Aes256Cfb,
        Self::Aes128Ctr,
        Self::Aes192Ctr,
        Self::Aes256Ctr,
        Self::Salsa20,
        Self::ChaCha20,
        Self::ChaCha20Ietf,
    ];

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        STREAM_CIPHERS
            .iter()
            .position(|&candidate| candidate == name)
            .map(|i| Self::ALL[i])
    }

    /// Canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        STREAM_CIPHERS[self as usize]
    }

    /// Key length in bytes.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Cfb | Self::Aes128Ctr => 16,
            Self::Aes192Cfb | Self::Aes192Ctr => 24,
            Self::Aes256Cfb
            | Self::Aes256Ctr
            | Self::Salsa20
            | Self::ChaCha20
            | Self::ChaCha20Ietf => 32,
        }
    }

    /// IV length in bytes.
    #[must_use]
    pub fn iv_len(self) -> usize {
        match self {
            Self::Salsa20 | Self::ChaCha20 => 8,
            Self::ChaCha20Ietf => 12,
            _ => 16,
        }
    }
}

/// A running keystream. CFB needs distinct encrypt/decrypt state; the other
/// modes are symmetric.
pub(crate) trait Keystream: Send {
    fn apply(&mut self, data: &mut [u8]);
}

struct Xor<C>(C);

impl<C: ApplyKeystream + Send> Keystream for Xor<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

struct CfbEncrypt<C: BlockEncryptMut + BlockCipher>(BufEncryptor<C>);

impl<C: BlockEncryptMut + BlockCipher + Send> Keystream for CfbEncrypt<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.encrypt(data);
    }
}

struct CfbDecrypt<C: BlockEncryptMut + BlockCipher>(BufDecryptor<C>);

impl<C: BlockEncryptMut + BlockCipher + Send> Keystream for CfbDecrypt<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.decrypt(data);
    }
}

fn key_error(method: StreamMethod, key: &[u8]) -> CryptoError {
    CryptoError::InvalidKeyLength {
        expected: method.key_len(),
        actual: key.len(),
    }
}

fn xor<C>(method: StreamMethod, key: &[u8], iv: &[u8]) -> Result<Box<dyn Keystream>, CryptoError>
where
    C: KeyIvInit + ApplyKeystream + Send + 'static,
{
    let cipher = C::new_from_slices(key, iv).map_err(|_| key_error(method, key))?;
    Ok(Box::new(Xor(cipher)))
}

fn cfb<C>(
    method: StreamMethod,
    key: &[u8],
    iv: &[u8],
    direction: Direction,
) -> Result<Box<dyn Keystream>, CryptoError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit + Send + 'static,
{
    Ok(match direction {
        Direction::Encrypt => Box::new(CfbEncrypt(
            BufEncryptor::<C>::new_from_slices(key, iv).map_err(|_| key_error(method, key))?,
        )),
        Direction::Decrypt => Box::new(CfbDecrypt(
            BufDecryptor::<C>::new_from_slices(key, iv).map_err(|_| key_error(method, key))?,
        )),
    })
}

/// Key a keystream for `method`.
pub(crate) fn keystream(
    method: StreamMethod,
    key: &[u8],
    iv: &[u8],
    direction: Direction,
) -> Result<Box<dyn Keystream>, CryptoError> {
    match method {
        StreamMethod::Aes128Cfb => cfb::<Aes128>(method, key, iv, direction),
        StreamMethod::Aes192Cfb => cfb::<Aes192>(method, key, iv, direction),
        StreamMethod::Aes256Cfb => cfb::<Aes256>(method, key, iv, direction),
        StreamMethod::Aes128Ctr => xor::<ctr::Ctr128BE<Aes128>>(method, key, iv),
        StreamMethod::Aes192Ctr => xor::<ctr::Ctr128BE<Aes192>>(method, key, iv),
        StreamMethod::Aes256Ctr => xor::<ctr::Ctr128BE<Aes256>>(method, key, iv),
        StreamMethod::Salsa20 => xor::<salsa20::Salsa20>(method, key, iv),
        StreamMethod::ChaCha20 => xor::<chacha20::ChaCha20Legacy>(method, key, iv),
        StreamMethod::ChaCha20Ietf => xor::<chacha20::ChaCha20>(method, key, iv),
    }
}

/// Stream-cipher family bound to one method and password.
pub struct StreamCipher {
    descriptor: CipherDescriptor,
    method: StreamMethod,
}

impl StreamCipher {
    /// Derive the key for `method` from `password`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidParameter`] for an empty password, or
    /// [`CryptoError::InvalidKeyLength`] if the primitive rejects the key.
    pub fn new(password: &str, method: StreamMethod) -> Result<Self, CryptoError> {
        if password.is_empty() {
            return Err(CryptoError::InvalidParameter(
                "password must not be empty".into(),
            ));
        }

        let key_len = method.key_len();
        let iv_len = method.iv_len();
        let mut key = Zeroizing::new([0u8; MAX_KEY_LENGTH]);
        bytes_to_key(password.as_bytes(), &mut key[..key_len]);

        // Key the primitive once so a bad key surfaces here, not per session
        keystream(method, &key[..key_len], &[0u8; MAX_NONCE_LENGTH][..iv_len], Direction::Encrypt)?;

        Ok(Self {
            descriptor: CipherDescriptor::new(CipherMethod::Stream(method), iv_len, key_len, 0, *key),
            method,
        })
    }

    fn key(&self) -> &[u8] {
        self.descriptor.key()
    }

    fn iv_len(&self) -> usize {
        self.descriptor.nonce_len()
    }

    fn random_iv(&self) -> Result<[u8; MAX_NONCE_LENGTH], CryptoError> {
        let mut iv = [0u8; MAX_NONCE_LENGTH];
        fill_random(&mut iv[..self.iv_len()])?;
        Ok(iv)
    }
}

impl CipherOps for StreamCipher {
    fn descriptor(&self) -> &CipherDescriptor {
        &self.descriptor
    }

    fn encrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError> {
        let iv_len = self.iv_len();
        let iv = self.random_iv()?;

        let mut ks = keystream(self.method, self.key(), &iv[..iv_len], Direction::Encrypt)?;
        ks.apply(buf.as_mut_slice());
        buf.prepend_from(&ByteBuffer::from(&iv[..iv_len]), capacity);
        Ok(())
    }

    fn decrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError> {
        let iv_len = self.iv_len();
        if buf.len() <= iv_len {
            return Err(CryptoError::InvalidMessage(format!(
                "datagram of {} bytes holds no payload after {iv_len}-byte IV",
                buf.len()
            )));
        }

        let mut ks = keystream(self.method, self.key(), &buf.as_slice()[..iv_len], Direction::Decrypt)?;
        buf.drain_front(iv_len);
        ks.apply(buf.as_mut_slice());
        buf.ensure_capacity(0, capacity);
        Ok(())
    }

    fn encrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError> {
        session.ensure_bound(self.descriptor.method(), Direction::Encrypt)?;
        let Transform::Stream(ks) = &mut session.transform else {
            return Err(CryptoError::InvalidState);
        };

        ks.apply(buf.as_mut_slice());
        session.counter += buf.len() as u64;

        if !session.init {
            let iv = ByteBuffer::from(&session.salt[..session.salt_len]);
            buf.prepend_from(&iv, capacity);
            session.init = true;
        } else {
            buf.ensure_capacity(0, capacity);
        }
        Ok(Flow::Ready)
    }

    fn decrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError> {
        session.ensure_bound(self.descriptor.method(), Direction::Decrypt)?;

        if !session.init {
            let iv_len = self.iv_len();
            let missing = iv_len - session.chunk.len();
            if buf.len() < missing {
                session.chunk.extend_from_slice(buf.as_slice());
                buf.clear();
                return Ok(Flow::NeedMore);
            }

            session.chunk.extend_from_slice(&buf.as_slice()[..missing]);
            buf.drain_front(missing);

            let ks = keystream(self.method, self.key(), session.chunk.as_slice(), Direction::Decrypt)?;
            session.salt[..iv_len].copy_from_slice(session.chunk.as_slice());
            session.salt_len = iv_len;
            session.transform = Transform::Stream(ks);
            session.chunk.clear();
            session.init = true;
        }

        if buf.is_empty() {
            return Ok(Flow::NeedMore);
        }

        let Transform::Stream(ks) = &mut session.transform else {
            return Err(CryptoError::InvalidState);
        };
        ks.apply(buf.as_mut_slice());
        session.counter += buf.len() as u64;
        buf.ensure_capacity(0, capacity);
        Ok(Flow::Ready)
    }

    fn ctx_init(&self, direction: Direction) -> Result<CipherSession, CryptoError> {
        let mut session = CipherSession::new(self.descriptor.method(), direction);

        if direction == Direction::Encrypt {
            let iv_len = self.iv_len();
            let iv = self.random_iv()?;
            session.transform =
                Transform::Stream(keystream(self.method, self.key(), &iv[..iv_len], direction)?);
            session.set_salt(&iv[..iv_len]);
        } else {
            session.chunk.allocate(self.iv_len());
        }
        Ok(session)
    }

    fn ctx_release(&self, session: &mut CipherSession) {
        session.reset();
    }
}
