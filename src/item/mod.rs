//! Encrypted upload items
//!
//! An [`EncryptedItem`] behaves like an ordinary buffered upload item, but
//! everything it stores is encrypted with a key that only the item holds.
//! Plaintext never reaches the backing memory buffer or temp file.

mod factory;

pub use factory::EncryptedItemFactory;

use crate::crypto::{
    decrypt_bytes, generate_key, wrap_for_decryption, wrap_for_encryption, DecryptingReader,
    EncryptingWriter, SymmetricKey, DEFAULT_KEY_SIZE, IV_SIZE,
};
use crate::error::{Error, Result};
use crate::storage::{BufferedStorage, DeferredStorage};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Upload item whose stored content is always encrypted
///
/// Write once through [`open_output_sink`](Self::open_output_sink), then
/// read any number of times. The raw temp file is deliberately not exposed.
pub struct EncryptedItem<S: BufferedStorage = DeferredStorage> {
    /// Form field name
    field_name: String,
    /// Content type sent by the client
    content_type: Option<String>,
    /// Whether this is a plain form field rather than a file upload
    is_form_field: bool,
    /// Original file name sent by the client
    file_name: Option<String>,
    /// Key for this item only
    key: SymmetricKey,
    /// Holds IV + ciphertext
    storage: S,
    /// Liveness token handed to the cleanup tracker
    owner: Arc<()>,
}

impl EncryptedItem<DeferredStorage> {
    /// Create an item backed by memory/disk storage, with a fresh key
    pub fn new(
        field_name: impl Into<String>,
        content_type: Option<&str>,
        is_form_field: bool,
        file_name: Option<&str>,
        size_threshold: usize,
        repository: Option<&Path>,
    ) -> Result<Self> {
        let storage = DeferredStorage::new(size_threshold, repository);
        let key = generate_key(DEFAULT_KEY_SIZE)?;
        Ok(Self::with_storage(
            field_name,
            content_type,
            is_form_field,
            file_name,
            storage,
            key,
        ))
    }

    /// Temp file the content spills to, for trusted callers only
    ///
    /// The file holds ciphertext. It must never be handed out as if it
    /// contained the upload.
    pub(crate) fn temp_file(&self) -> &Path {
        self.storage.temp_path()
    }
}

impl<S: BufferedStorage> EncryptedItem<S> {
    /// Wrap existing storage with the given key
    pub fn with_storage(
        field_name: impl Into<String>,
        content_type: Option<&str>,
        is_form_field: bool,
        file_name: Option<&str>,
        storage: S,
        key: SymmetricKey,
    ) -> Self {
        EncryptedItem {
            field_name: field_name.into(),
            content_type: content_type.map(str::to_string),
            is_form_field,
            file_name: file_name.map(str::to_string),
            key,
            storage,
            owner: Arc::new(()),
        }
    }

    /// Start a write pass
    ///
    /// Each call starts a new stream with a fresh IV; treat items as
    /// write-once.
    pub fn open_output_sink(&mut self) -> Result<EncryptingWriter<Box<dyn Write + '_>>> {
        let sink = self.storage.open_raw_output_sink()?;
        wrap_for_encryption(sink, &self.key)
    }

    /// Read the plaintext back as a stream
    pub fn open_input_source(&self) -> Result<DecryptingReader<Box<dyn Read + '_>>> {
        let source = self.storage.open_raw_input_source()?;
        wrap_for_decryption(source, &self.key)
    }

    /// Whole plaintext, or `None` if there is nothing stored
    pub fn read_all(&self) -> Result<Option<Vec<u8>>> {
        match self.storage.raw_contents()? {
            Some(raw) => decrypt_bytes(&raw, &self.key).map(Some),
            None => Ok(None),
        }
    }

    /// Whole plaintext as UTF-8, replacing invalid sequences
    ///
    /// The content type's charset is not consulted. Callers that need
    /// another encoding should decode [`read_all`](Self::read_all) themselves.
    pub fn read_string(&self) -> Result<Option<String>> {
        Ok(self
            .read_all()?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Plaintext size in bytes
    pub fn size(&self) -> u64 {
        self.storage.raw_length().saturating_sub(IV_SIZE as u64)
    }

    /// Write the plaintext to `dest`
    ///
    /// The content is always decrypted and copied. The backing file is
    /// never moved, since it only holds ciphertext.
    pub fn materialize_to(&self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        let mut source = self.open_input_source()?;
        let mut out = File::create(dest)?;

        let copied = io::copy(&mut source, &mut out)?;
        out.sync_all()?;

        debug!("Materialized {} bytes to {}", copied, dest.display());
        Ok(())
    }

    /// Drop cached content and delete the temp file, if any
    ///
    /// Safe to call more than once.
    pub fn discard(&mut self) -> Result<()> {
        self.storage.clear_cache();

        if self.storage.is_in_memory() {
            return Ok(());
        }

        if let Some(path) = self.storage.raw_storage_path() {
            match fs::remove_file(path) {
                Ok(()) => debug!("Deleted temp file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Always fails
    ///
    /// The only location there is would be the encrypted temp file, and
    /// anyone asking for it expects plaintext. Use
    /// [`open_input_source`](Self::open_input_source) or
    /// [`materialize_to`](Self::materialize_to) instead.
    pub fn store_location(&self) -> Result<PathBuf> {
        Err(Error::Unsupported(
            "EncryptedItem does not expose its temp file: the raw file is encrypted, \
             so moving or reading it directly will not yield the upload. \
             Use open_input_source() or materialize_to() instead"
                .to_string(),
        ))
    }

    /// Form field name
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn set_field_name(&mut self, field_name: impl Into<String>) {
        self.field_name = field_name.into();
    }

    /// Content type sent by the client
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Original file name sent by the client
    pub fn name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn is_form_field(&self) -> bool {
        self.is_form_field
    }

    pub fn set_form_field(&mut self, is_form_field: bool) {
        self.is_form_field = is_form_field;
    }

    /// Whether the encrypted content is held in memory
    pub fn is_in_memory(&self) -> bool {
        self.storage.is_in_memory()
    }

    pub(crate) fn owner(&self) -> &Arc<()> {
        &self.owner
    }
}

impl<S: BufferedStorage> fmt::Display for EncryptedItem<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self
            .storage
            .raw_storage_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());

        write!(
            f,
            "name={}, store_location={}, size={} bytes, is_form_field={}, field_name={}",
            self.name().unwrap_or("-"),
            location,
            self.size(),
            self.is_form_field,
            self.field_name
        )
    }
}
