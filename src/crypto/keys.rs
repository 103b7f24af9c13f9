//! Ephemeral item keys
//!
//! Every encrypted item gets its own key, generated from the system CSPRNG
//! when the item is created. Keys are never persisted and their bytes are
//! wiped when the key is dropped.

use crate::crypto::{fill_random, CIPHER_NAME};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// AES key strength
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeySize {
    /// 128-bit key, usable everywhere
    #[default]
    Aes128,
    /// 192-bit key
    Aes192,
    /// 256-bit key
    Aes256,
}

impl KeySize {
    /// Key length in bits
    pub fn bits(self) -> usize {
        self.byte_len() * 8
    }

    /// Key length in bytes
    pub fn byte_len(self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes192 => 24,
            KeySize::Aes256 => 32,
        }
    }

    /// Look up the key size for a raw key length in bytes
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(KeySize::Aes128),
            24 => Some(KeySize::Aes192),
            32 => Some(KeySize::Aes256),
            _ => None,
        }
    }
}

impl fmt::Display for KeySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AES-{}", self.bits())
    }
}

impl FromStr for KeySize {
    type Err = Error;

    /// Accepts `128`, `aes128` or `AES-128` (and the 192/256 variants)
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "");
        match normalized.trim_start_matches("aes") {
            "128" => Ok(KeySize::Aes128),
            "192" => Ok(KeySize::Aes192),
            "256" => Ok(KeySize::Aes256),
            _ => Err(Error::InvalidConfig(format!("Unknown key size: {}", s))),
        }
    }
}

/// Secret key for a single encrypted item
pub struct SymmetricKey {
    bytes: Zeroizing<Vec<u8>>,
    size: KeySize,
}

impl SymmetricKey {
    /// Generate a new random key
    pub fn generate(size: KeySize) -> Result<Self> {
        let mut bytes = Zeroizing::new(vec![0u8; size.byte_len()]);
        fill_random(&mut bytes)?;
        Ok(SymmetricKey { bytes, size })
    }

    /// Wrap existing key material
    ///
    /// Only 128, 192 and 256-bit keys are accepted. Anything else is
    /// rejected rather than truncated or padded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let size = KeySize::from_len(bytes.len()).ok_or_else(|| {
            let mut message = format!(
                "{}-bit keys are not supported for {}",
                bytes.len() * 8,
                CIPHER_NAME
            );
            if bytes.len() > KeySize::Aes256.byte_len() {
                message.push_str(". The largest supported key is 256 bits");
            }
            Error::InvalidKey(message)
        })?;

        Ok(SymmetricKey {
            bytes: Zeroizing::new(bytes.to_vec()),
            size,
        })
    }

    /// Strength of this key
    pub fn key_size(&self) -> KeySize {
        self.size
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Generate a fresh key for one item
pub fn generate_key(size: KeySize) -> Result<SymmetricKey> {
    SymmetricKey::generate(size)
}
