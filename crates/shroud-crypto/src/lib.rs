//! # SHROUD Crypto
//!
//! Cipher dispatch for the SHROUD tunnel.
//!
//! This crate provides:
//! - A single [`Crypto`] handle over two method families, chosen by name
//! - Streamed and whole-buffer encryption over [`ByteBuffer`]s
//! - Per-connection [`CipherSession`] state with salt/IV and nonce tracking
//! - A process-wide [`ReplayFilter`] for salts and IVs
//! - Startup checks for the OS random generator and entropy pool
//!
//! ## Method Families
//!
//! | Family | Methods | Key | Nonce | Tag |
//! |--------|---------|-----|-------|-----|
//! | Stream | `aes-{128,192,256}-cfb`, `aes-{128,192,256}-ctr` | 16/24/32 | 16 (IV) | 0 |
//! | Stream | `salsa20`, `chacha20` | 32 | 8 (IV) | 0 |
//! | Stream | `chacha20-ietf` | 32 | 12 (IV) | 0 |
//! | AEAD | `aes-{128,192,256}-gcm` | 16/24/32 | 12 | 16 |
//! | AEAD | `chacha20-ietf-poly1305` | 32 | 12 | 16 |
//! | AEAD | `xchacha20-ietf-poly1305` | 32 | 24 | 16 |
//!
//! The master key is derived from the password with the MD5-chained
//! [`digest::bytes_to_key`]. AEAD sessions further derive a subkey from a
//! 16-byte salt with salted, personalized BLAKE2b.
//!
//! ## Example
//!
//! ```
//! use shroud_crypto::{ByteBuffer, Crypto, Direction};
//!
//! let crypto = Crypto::new("correct horse", "aes-256-gcm")?;
//! let mut enc = crypto.ctx_init(Direction::Encrypt)?;
//! let mut dec = crypto.ctx_init(Direction::Decrypt)?;
//!
//! let mut buf = ByteBuffer::from(&b"hello"[..]);
//! assert!(crypto.encrypt(&mut buf, &mut enc, 0)?.is_ready());
//! assert!(crypto.decrypt(&mut buf, &mut dec, 0)?.is_ready());
//! assert_eq!(buf.as_slice(), b"hello");
//! # Ok::<(), shroud_crypto::CryptoError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod aead;
pub mod buffer;
pub mod config;
pub mod crypto;
pub mod digest;
pub mod entropy;
pub mod error;
pub mod random;
pub mod replay;
pub mod runtime;
pub mod session;
pub mod stream;

pub use buffer::ByteBuffer;
pub use config::{CryptoConfig, ReplayConfig, Role};
pub use crypto::{CipherDescriptor, CipherFamily, CipherMethod, CipherOps, Crypto, supported_methods};
pub use error::CryptoError;
pub use replay::ReplayFilter;
pub use runtime::Runtime;
pub use session::{CipherSession, Direction, Flow};

/// Largest key any supported method uses, with headroom
pub const MAX_KEY_LENGTH: usize = 64;

/// Largest nonce or IV any supported method uses, with headroom
pub const MAX_NONCE_LENGTH: usize = 32;
