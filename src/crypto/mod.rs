//! Cryptography module for upcrypt
//!
//! Provides AES-CTR stream encryption with a random IV stored as an
//! unencrypted prefix of every encrypted stream. Keys are ephemeral and
//! live only as long as the item that owns them.

mod keys;
mod stream;

pub use keys::{generate_key, KeySize, SymmetricKey};
pub use stream::{decrypt_bytes, wrap_for_decryption, wrap_for_encryption, DecryptingReader, EncryptingWriter};

use crate::error::{Error, Result};
use ring::rand::{SecureRandom, SystemRandom};

/// Cipher identity, in `algorithm/mode/padding` form
pub const CIPHER_NAME: &str = "AES/CTR/NoPadding";

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of the initialisation vector prefixed to every encrypted stream
pub const IV_SIZE: usize = BLOCK_SIZE;

/// Key size used when nothing else is configured
pub const DEFAULT_KEY_SIZE: KeySize = KeySize::Aes128;

/// Fill `buf` from the system CSPRNG
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    SystemRandom::new().fill(buf).map_err(|_| {
        Error::Configuration("System secure random source is unavailable".to_string())
    })
}
