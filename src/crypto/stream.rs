//! AES-CTR stream framing
//!
//! An encrypted stream is laid out as:
//!
//! ```text
//! [ IV: 16 raw bytes, unencrypted ][ ciphertext: N bytes ]
//! ```
//!
//! CTR mode turns AES into a stream cipher, so the ciphertext is exactly as
//! long as the plaintext and no padding is needed. There is no
//! authentication tag: flipping a ciphertext bit flips the same plaintext bit.

use crate::crypto::{fill_random, KeySize, SymmetricKey, CIPHER_NAME, IV_SIZE};
use crate::error::{Error, Result};
use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use std::io::{self, Read, Write};
use tracing::debug;

/// Max plaintext encrypted per inner write
const CHUNK_SIZE: usize = 8 * 1024;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type Aes192Ctr = ctr::Ctr128BE<Aes192>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Keystream generator for whichever key size the item uses
enum CtrCipher {
    Aes128(Aes128Ctr),
    Aes192(Aes192Ctr),
    Aes256(Aes256Ctr),
}

impl CtrCipher {
    fn new(key: &SymmetricKey, iv: &[u8; IV_SIZE]) -> Result<Self> {
        let bytes = key.as_bytes();
        let size = key.key_size();
        let cipher = match size {
            KeySize::Aes128 => {
                Aes128Ctr::new_from_slices(bytes, iv).map(CtrCipher::Aes128)
            }
            KeySize::Aes192 => {
                Aes192Ctr::new_from_slices(bytes, iv).map(CtrCipher::Aes192)
            }
            KeySize::Aes256 => {
                Aes256Ctr::new_from_slices(bytes, iv).map(CtrCipher::Aes256)
            }
        };

        cipher.map_err(|_| {
            let mut message = format!("The given {} key is not usable for {}", size, CIPHER_NAME);
            if size != KeySize::Aes128 {
                message.push_str(
                    ". Restricted cryptographic policy environments may only allow 128-bit keys",
                );
            }
            Error::InvalidKey(message)
        })
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            CtrCipher::Aes128(c) => c.apply_keystream(buf),
            CtrCipher::Aes192(c) => c.apply_keystream(buf),
            CtrCipher::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

/// Encrypts everything written to it before passing it on
///
/// The IV has already been written to the inner sink by the time this
/// writer is handed out.
pub struct EncryptingWriter<W: Write> {
    inner: W,
    cipher: CtrCipher,
    iv: [u8; IV_SIZE],
    scratch: Vec<u8>,
}

impl<W: Write> EncryptingWriter<W> {
    /// IV used for this stream
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Get a reference to the inner sink
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Flush and hand back the inner sink
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let len = buf.len().min(CHUNK_SIZE);
        self.scratch.clear();
        self.scratch.extend_from_slice(&buf[..len]);
        self.cipher.apply_keystream(&mut self.scratch);

        // The keystream has advanced by `len`, so all of it must land
        self.inner.write_all(&self.scratch)?;
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts everything read through it
pub struct DecryptingReader<R: Read> {
    inner: R,
    cipher: CtrCipher,
}

impl<R: Read> DecryptingReader<R> {
    /// Hand back the inner source, positioned after the last byte read
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

/// Start an encrypted stream on `sink`
///
/// A fresh IV is generated and written to `sink` straight away. Every byte
/// written to the returned writer is encrypted before it reaches `sink`.
pub fn wrap_for_encryption<W: Write>(mut sink: W, key: &SymmetricKey) -> Result<EncryptingWriter<W>> {
    let mut iv = [0u8; IV_SIZE];
    fill_random(&mut iv)?;
    let cipher = CtrCipher::new(key, &iv)?;

    sink.write_all(&iv)?;
    debug!("Started {} stream with {} key", CIPHER_NAME, key.key_size());

    Ok(EncryptingWriter {
        inner: sink,
        cipher,
        iv,
        scratch: Vec::with_capacity(CHUNK_SIZE),
    })
}

/// Open an encrypted stream from `source`
///
/// Consumes the IV prefix. Bytes read from the returned reader are the
/// original plaintext with no framing left.
pub fn wrap_for_decryption<R: Read>(mut source: R, key: &SymmetricKey) -> Result<DecryptingReader<R>> {
    let iv = read_iv(&mut source)?;
    let cipher = CtrCipher::new(key, &iv)?;

    Ok(DecryptingReader {
        inner: source,
        cipher,
    })
}

/// Decrypt a fully buffered `IV || ciphertext` in one pass
pub fn decrypt_bytes(stored: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    if stored.len() < IV_SIZE {
        return Err(Error::TruncatedIv {
            expected: IV_SIZE,
            got: stored.len(),
        });
    }

    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(&stored[..IV_SIZE]);
    let mut cipher = CtrCipher::new(key, &iv)?;

    let mut plaintext = stored[IV_SIZE..].to_vec();
    cipher.apply_keystream(&mut plaintext);
    Ok(plaintext)
}

/// Read exactly one IV, tolerating short reads
///
/// End of stream before a whole IV has arrived means the stored data is
/// corrupt.
fn read_iv<R: Read>(source: &mut R) -> Result<[u8; IV_SIZE]> {
    let mut iv = [0u8; IV_SIZE];
    let mut read = 0;

    while read < IV_SIZE {
        match source.read(&mut iv[read..]) {
            Ok(0) => {
                return Err(Error::TruncatedIv {
                    expected: IV_SIZE,
                    got: read,
                })
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(iv)
}
