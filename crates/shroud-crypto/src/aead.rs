//! AEAD method family.
//!
//! Provides AES-GCM and (X)ChaCha20-Poly1305 with per-session subkeys:
//! - 128/192/256-bit keys, 16-byte salts for every method
//! - Subkey = BLAKE2b(key = master key, salt, personal = "fuckshadows-g3nk"),
//!   sized to the key length
//! - 96-bit nonces (192-bit for XChaCha20), little-endian counters from zero
//! - 128-bit authentication tags
//!
//! ## Framing
//!
//! Streamed, after a one-time salt prefix, plaintext is cut into chunks of
//! at most [`MAX_CHUNK_LEN`] bytes and each is sent as:
//!
//! ```text
//! [ E(len: u16 BE) | tag ][ E(payload) | tag ]
//! ```
//!
//! Each seal or open consumes one nonce. A reader that has the length block
//! but not the whole payload keeps the bytes buffered and does not advance
//! the nonce, so the length is simply opened again on the next call.
//!
//! Whole-buffer, each datagram is `salt ‖ E(payload) ‖ tag` under a zero
//! nonce; the fresh salt gives every datagram its own subkey.

use crate::buffer::ByteBuffer;
use crate::crypto::{CipherDescriptor, CipherMethod, CipherOps};
use crate::digest::{bytes_to_key, dump};
use crate::random::fill_random;
use crate::session::{CipherSession, Direction, Flow, Transform};
use crate::{CryptoError, MAX_KEY_LENGTH, MAX_NONCE_LENGTH};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::aead::consts::U12;
use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, XChaCha20Poly1305};
use blake2::Blake2bMac;
use blake2::digest::Mac;
use blake2::digest::consts::{U16, U24, U32};
use zeroize::Zeroizing;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// Largest payload carried by one streamed chunk.
pub const MAX_CHUNK_LEN: usize = 0x3FFF;

/// Encrypted length prefix size, before its tag.
const CHUNK_LEN_SIZE: usize = 2;

/// Session salt length, the BLAKE2b salt size.
pub const SALT_LEN: usize = 16;

/// BLAKE2b personalization for session subkeys.
const SUBKEY_PERSONAL: &[u8; 16] = b"fuckshadows-g3nk";

/// Supported AEAD method names, in lookup order.
///
/// Index `i` names `AeadMethod::ALL[i]`.
pub const AEAD_CIPHERS: [&str; 5] = [
    "aes-128-gcm",
    "aes-192-gcm",
    "aes-256-gcm",
    "chacha20-ietf-poly1305",
    "xchacha20-ietf-poly1305",
];

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

/// AEAD methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AeadMethod {
    /// AES-128-GCM
    Aes128Gcm,
    /// AES-192-GCM
    Aes192Gcm,
    /// AES-256-GCM
    Aes256Gcm,
    /// ChaCha20-Poly1305 (RFC 8439)
    ChaCha20Poly1305,
    /// XChaCha20-Poly1305 (extended nonce)
    XChaCha20Poly1305,
}

impl AeadMethod {
    /// All methods, in the same order as [`AEAD_CIPHERS`].
    pub const ALL: [AeadMethod; 5] = [
        Self::Aes128Gcm,
        Self::Aes192Gcm,
        Self::Aes256Gcm,
        Self::ChaCha20Poly1305,
        Self::XChaCha20Poly1305,
    ];

    /// Exact, case-sensitive lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        AEAD_CIPHERS
            .iter()
            .position(|&candidate| candidate == name)
            .map(|i| Self::ALL[i])
    }

    /// Canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        AEAD_CIPHERS[self as usize]
    }

    /// Key length in bytes.
    #[must_use]
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes192Gcm => 24,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 | Self::XChaCha20Poly1305 => 32,
        }
    }

    /// Nonce length in bytes.
    #[must_use]
    pub fn nonce_len(self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => 24,
            _ => 12,
        }
    }
}

/// A keyed AEAD primitive.
pub(crate) enum AeadTransform {
    Aes128Gcm(Aes128Gcm),
    Aes192Gcm(Aes192Gcm),
    Aes256Gcm(Aes256Gcm),
    ChaCha20Poly1305(ChaCha20Poly1305),
    XChaCha20Poly1305(XChaCha20Poly1305),
}

impl AeadTransform {
    fn new(method: AeadMethod, key: &[u8]) -> Result<Self, CryptoError> {
        let bad_len = |_| CryptoError::InvalidKeyLength {
            expected: method.key_len(),
            actual: key.len(),
        };

        Ok(match method {
            AeadMethod::Aes128Gcm => Self::Aes128Gcm(Aes128Gcm::new_from_slice(key).map_err(bad_len)?),
            AeadMethod::Aes192Gcm => Self::Aes192Gcm(Aes192Gcm::new_from_slice(key).map_err(bad_len)?),
            AeadMethod::Aes256Gcm => Self::Aes256Gcm(Aes256Gcm::new_from_slice(key).map_err(bad_len)?),
            AeadMethod::ChaCha20Poly1305 => {
                Self::ChaCha20Poly1305(ChaCha20Poly1305::new_from_slice(key).map_err(bad_len)?)
            }
            AeadMethod::XChaCha20Poly1305 => {
                Self::XChaCha20Poly1305(XChaCha20Poly1305::new_from_slice(key).map_err(bad_len)?)
            }
        })
    }

    /// Encrypt `data` in place, returning the detached tag.
    fn seal(&self, nonce: &[u8], data: &mut [u8]) -> Result<[u8; TAG_SIZE], CryptoError> {
        match self {
            Self::Aes128Gcm(c) => seal_with(c, nonce, data),
            Self::Aes192Gcm(c) => seal_with(c, nonce, data),
            Self::Aes256Gcm(c) => seal_with(c, nonce, data),
            Self::ChaCha20Poly1305(c) => seal_with(c, nonce, data),
            Self::XChaCha20Poly1305(c) => seal_with(c, nonce, data),
        }
    }

    /// Verify `tag` and decrypt `data` in place.
    fn open(&self, nonce: &[u8], data: &mut [u8], tag: &[u8]) -> Result<(), CryptoError> {
        match self {
            Self::Aes128Gcm(c) => open_with(c, nonce, data, tag),
            Self::Aes192Gcm(c) => open_with(c, nonce, data, tag),
            Self::Aes256Gcm(c) => open_with(c, nonce, data, tag),
            Self::ChaCha20Poly1305(c) => open_with(c, nonce, data, tag),
            Self::XChaCha20Poly1305(c) => open_with(c, nonce, data, tag),
        }
    }
}

fn seal_with<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8],
    data: &mut [u8],
) -> Result<[u8; TAG_SIZE], CryptoError> {
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], data)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);
    Ok(tag_bytes)
}

fn open_with<A: AeadInPlace>(
    cipher: &A,
    nonce: &[u8],
    data: &mut [u8],
    tag: &[u8],
) -> Result<(), CryptoError> {
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            &[],
            data,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Increment a little-endian nonce by one, wrapping.
fn increment_nonce(nonce: &mut [u8]) {
    for byte in nonce {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

/// AEAD family bound to one method and password.
pub struct AeadCipher {
    descriptor: CipherDescriptor,
    method: AeadMethod,
}

impl AeadCipher {
    /// Derive the master key for `method` from `password`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidParameter`] for an empty password, or
    /// [`CryptoError::InvalidKeyLength`] if the primitive rejects the key.
    pub fn new(password: &str, method: AeadMethod) -> Result<Self, CryptoError> {
        if password.is_empty() {
            return Err(CryptoError::InvalidParameter(
                "password must not be empty".into(),
            ));
        }

        let key_len = method.key_len();
        let mut key = Zeroizing::new([0u8; MAX_KEY_LENGTH]);
        bytes_to_key(password.as_bytes(), &mut key[..key_len]);
        AeadTransform::new(method, &key[..key_len])?;

        Ok(Self {
            descriptor: CipherDescriptor::new(
                CipherMethod::Aead(method),
                method.nonce_len(),
                key_len,
                TAG_SIZE,
                *key,
            ),
            method,
        })
    }

    fn nonce_len(&self) -> usize {
        self.descriptor.nonce_len()
    }

    /// Keyed BLAKE2b of the empty message, salted and personalized, filling
    /// `subkey`.
    fn derive_subkey(&self, salt: &[u8], subkey: &mut [u8]) -> Result<(), CryptoError> {
        let key = self.descriptor.key();
        let failed = |_| CryptoError::KeyDerivationFailed;

        match subkey.len() {
            16 => subkey.copy_from_slice(
                &Blake2bMac::<U16>::new_with_salt_and_personal(key, salt, SUBKEY_PERSONAL)
                    .map_err(failed)?
                    .finalize()
                    .into_bytes(),
            ),
            24 => subkey.copy_from_slice(
                &Blake2bMac::<U24>::new_with_salt_and_personal(key, salt, SUBKEY_PERSONAL)
                    .map_err(failed)?
                    .finalize()
                    .into_bytes(),
            ),
            32 => subkey.copy_from_slice(
                &Blake2bMac::<U32>::new_with_salt_and_personal(key, salt, SUBKEY_PERSONAL)
                    .map_err(failed)?
                    .finalize()
                    .into_bytes(),
            ),
            _ => return Err(CryptoError::KeyDerivationFailed),
        }
        Ok(())
    }

    fn keyed(&self, salt: &[u8]) -> Result<AeadTransform, CryptoError> {
        let key_len = self.descriptor.key_len();
        let mut subkey = Zeroizing::new([0u8; MAX_KEY_LENGTH]);
        self.derive_subkey(salt, &mut subkey[..key_len])?;
        AeadTransform::new(self.method, &subkey[..key_len])
    }

    /// Key `session` from `salt`, resetting its nonce.
    fn key_session(&self, session: &mut CipherSession, salt: &[u8]) -> Result<(), CryptoError> {
        let key_len = self.descriptor.key_len();
        self.derive_subkey(salt, &mut session.subkey[..key_len])?;
        session.transform =
            Transform::Aead(AeadTransform::new(self.method, &session.subkey[..key_len])?);
        session.set_salt(salt);
        session.nonce = [0u8; MAX_NONCE_LENGTH];
        dump("session salt", salt);
        Ok(())
    }
}

/// Try to open one chunk at the front of `data`.
///
/// Returns the payload range and bytes consumed, or `None` if `data` does
/// not yet hold the whole chunk. The nonce advances only on success.
fn open_chunk(
    aead: &AeadTransform,
    nonce: &mut [u8],
    data: &mut [u8],
) -> Result<Option<(std::ops::Range<usize>, usize)>, CryptoError> {
    let header_len = CHUNK_LEN_SIZE + TAG_SIZE;
    if data.len() <= header_len + TAG_SIZE {
        return Ok(None);
    }

    // Open a copy so the wire bytes stay intact if the payload is incomplete
    let mut len_bytes = [0u8; CHUNK_LEN_SIZE];
    len_bytes.copy_from_slice(&data[..CHUNK_LEN_SIZE]);
    aead.open(nonce, &mut len_bytes, &data[CHUNK_LEN_SIZE..header_len])?;

    let payload_len = usize::from(u16::from_be_bytes(len_bytes)) & MAX_CHUNK_LEN;
    if payload_len == 0 {
        return Err(CryptoError::InvalidMessage("zero-length chunk".into()));
    }

    let chunk_len = header_len + payload_len + TAG_SIZE;
    if data.len() < chunk_len {
        return Ok(None);
    }

    increment_nonce(nonce);
    let payload_end = header_len + payload_len;
    let (payload, tag) = data[header_len..chunk_len].split_at_mut(payload_len);
    aead.open(nonce, payload, tag)?;
    increment_nonce(nonce);

    Ok(Some((header_len..payload_end, chunk_len)))
}

impl CipherOps for AeadCipher {
    fn descriptor(&self) -> &CipherDescriptor {
        &self.descriptor
    }

    fn encrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;

        let aead = self.keyed(&salt)?;
        let nonce = [0u8; MAX_NONCE_LENGTH];
        let tag = aead.seal(&nonce[..self.nonce_len()], buf.as_mut_slice())?;

        buf.extend_from_slice(&tag);
        buf.prepend_from(&ByteBuffer::from(&salt[..]), capacity);
        Ok(())
    }

    fn decrypt_all(&self, buf: &mut ByteBuffer, capacity: usize) -> Result<(), CryptoError> {
        if buf.len() < SALT_LEN + TAG_SIZE {
            return Err(CryptoError::InvalidMessage(format!(
                "datagram of {} bytes shorter than salt and tag",
                buf.len()
            )));
        }

        let aead = self.keyed(&buf.as_slice()[..SALT_LEN])?;
        let nonce = [0u8; MAX_NONCE_LENGTH];
        let body_len = buf.len() - SALT_LEN - TAG_SIZE;
        let (payload, tag) = buf.as_mut_slice()[SALT_LEN..].split_at_mut(body_len);
        aead.open(&nonce[..self.nonce_len()], payload, tag)?;

        buf.drain_front(SALT_LEN);
        buf.truncate(body_len);
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
        let Transform::Aead(aead) = &session.transform else {
            return Err(CryptoError::InvalidState);
        };

        let nonce_len = self.nonce_len();
        let chunks = buf.len().div_ceil(MAX_CHUNK_LEN) as u64;
        if session.counter.checked_add(chunks * 2).is_none() {
            return Err(CryptoError::NonceOverflow);
        }

        let out = &mut session.chunk;
        out.clear();
        if !session.init {
            out.extend_from_slice(&session.salt[..session.salt_len]);
        }

        for piece in buf.as_slice().chunks(MAX_CHUNK_LEN) {
            let start = out.len();
            out.extend_from_slice(&(piece.len() as u16).to_be_bytes());
            let tag = aead.seal(&session.nonce[..nonce_len], &mut out.as_mut_slice()[start..])?;
            out.extend_from_slice(&tag);
            increment_nonce(&mut session.nonce[..nonce_len]);

            let start = out.len();
            out.extend_from_slice(piece);
            let tag = aead.seal(&session.nonce[..nonce_len], &mut out.as_mut_slice()[start..])?;
            out.extend_from_slice(&tag);
            increment_nonce(&mut session.nonce[..nonce_len]);

            session.counter += 2;
            tracing::trace!(len = piece.len(), counter = session.counter, "sealed chunk");
        }

        buf.assign(out.as_slice());
        buf.ensure_capacity(0, capacity);
        out.clear();
        session.init = true;
        Ok(Flow::Ready)
    }

    fn decrypt(
        &self,
        buf: &mut ByteBuffer,
        session: &mut CipherSession,
        capacity: usize,
    ) -> Result<Flow, CryptoError> {
        session.ensure_bound(self.descriptor.method(), Direction::Decrypt)?;

        session.chunk.extend_from_slice(buf.as_slice());
        buf.clear();

        if !session.init {
            if session.chunk.len() < SALT_LEN {
                return Ok(Flow::NeedMore);
            }

            let mut salt = [0u8; SALT_LEN];
            salt.copy_from_slice(&session.chunk.as_slice()[..SALT_LEN]);
            self.key_session(session, &salt)?;
            session.chunk.drain_front(SALT_LEN);
            session.init = true;
        }

        let Transform::Aead(aead) = &session.transform else {
            return Err(CryptoError::InvalidState);
        };

        let nonce_len = self.nonce_len();
        let mut consumed = 0;
        loop {
            let pending = &mut session.chunk.as_mut_slice()[consumed..];
            let Some((payload, used)) = open_chunk(aead, &mut session.nonce[..nonce_len], pending)?
            else {
                break;
            };

            buf.extend_from_slice(&pending[payload]);
            consumed += used;
            session.counter += 2;
        }

        session.chunk.drain_front(consumed);
        buf.ensure_capacity(0, capacity);

        if buf.is_empty() {
            return Ok(Flow::NeedMore);
        }
        Ok(Flow::Ready)
    }

    fn ctx_init(&self, direction: Direction) -> Result<CipherSession, CryptoError> {
        let mut session = CipherSession::new(self.descriptor.method(), direction);

        if direction == Direction::Encrypt {
            let mut salt = [0u8; SALT_LEN];
            fill_random(&mut salt)?;
            self.key_session(&mut session, &salt)?;
        }
        session.chunk.allocate(MAX_CHUNK_LEN + 2 * TAG_SIZE + CHUNK_LEN_SIZE);
        Ok(session)
    }

    fn ctx_release(&self, session: &mut CipherSession) {
        session.reset();
    }
}
