//! Factory for encrypted upload items

use crate::cleanup::FileCleaningTracker;
use crate::config::{Config, DEFAULT_SIZE_THRESHOLD};
use crate::crypto::{generate_key, KeySize, DEFAULT_KEY_SIZE};
use crate::error::Result;
use crate::item::EncryptedItem;
use crate::storage::DeferredStorage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Creates [`EncryptedItem`]s, each with its own freshly generated key
#[derive(Clone)]
pub struct EncryptedItemFactory {
    /// Max encrypted bytes kept in memory per item
    size_threshold: usize,
    /// Directory for temp files (system temp dir if unset)
    repository: Option<PathBuf>,
    key_size: KeySize,
    tracker: Option<Arc<FileCleaningTracker>>,
}

impl Default for EncryptedItemFactory {
    fn default() -> Self {
        EncryptedItemFactory::new(DEFAULT_SIZE_THRESHOLD, None)
    }
}

impl EncryptedItemFactory {
    /// Create a factory with the given threshold and repository
    pub fn new(size_threshold: usize, repository: Option<PathBuf>) -> Self {
        EncryptedItemFactory {
            size_threshold,
            repository,
            key_size: DEFAULT_KEY_SIZE,
            tracker: None,
        }
    }

    /// Create a factory from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        EncryptedItemFactory::new(
            config.storage.size_threshold,
            config.storage.repository.clone(),
        )
        .with_key_size(config.encryption.key_size)
    }

    /// Use a different key strength for new items
    pub fn with_key_size(mut self, key_size: KeySize) -> Self {
        self.key_size = key_size;
        self
    }

    /// Register every new item's temp file with `tracker`
    pub fn with_tracker(mut self, tracker: Arc<FileCleaningTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn size_threshold(&self) -> usize {
        self.size_threshold
    }

    pub fn repository(&self) -> Option<&Path> {
        self.repository.as_deref()
    }

    pub fn key_size(&self) -> KeySize {
        self.key_size
    }

    pub fn tracker(&self) -> Option<&Arc<FileCleaningTracker>> {
        self.tracker.as_ref()
    }

    /// Create a new item
    pub fn create_item(
        &self,
        field_name: &str,
        content_type: Option<&str>,
        is_form_field: bool,
        file_name: Option<&str>,
    ) -> Result<EncryptedItem> {
        let storage = DeferredStorage::new(self.size_threshold, self.repository.as_deref());
        let key = generate_key(self.key_size)?;
        let item = EncryptedItem::with_storage(
            field_name,
            content_type,
            is_form_field,
            file_name,
            storage,
            key,
        );

        // The tracker sees the raw, encrypted file, never a decrypted copy
        if let Some(tracker) = &self.tracker {
            tracker.track(item.temp_file(), item.owner());
        }

        debug!(
            "Created encrypted item for field '{}' ({} key)",
            field_name, self.key_size
        );
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_factory() {
        let factory = EncryptedItemFactory::default();

        assert_eq!(factory.size_threshold(), DEFAULT_SIZE_THRESHOLD);
        assert!(factory.repository().is_none());
        assert_eq!(factory.key_size(), KeySize::Aes128);
        assert!(factory.tracker().is_none());
    }

    #[test]
    fn test_create_item_metadata() {
        let temp = TempDir::new().unwrap();
        let factory = EncryptedItemFactory::new(64, Some(temp.path().to_path_buf()));

        let item = factory
            .create_item("file", Some("image/png"), false, Some("cat.png"))
            .unwrap();

        assert_eq!(item.field_name(), "file");
        assert_eq!(item.content_type(), Some("image/png"));
        assert_eq!(item.name(), Some("cat.png"));
        assert!(!item.is_form_field());
        assert!(item.temp_file().starts_with(temp.path()));
        assert_eq!(item.storage.threshold(), 64);
    }

    #[test]
    fn test_each_item_gets_its_own_key() {
        let factory = EncryptedItemFactory::default();

        let a = factory.create_item("a", None, true, None).unwrap();
        let b = factory.create_item("b", None, true, None).unwrap();

        assert_ne!(a.key.as_bytes(), b.key.as_bytes());
    }

    #[test]
    fn test_key_size_applies_to_items() {
        let factory = EncryptedItemFactory::default().with_key_size(KeySize::Aes256);
        let mut item = factory.create_item("f", None, false, None).unwrap();
        assert_eq!(item.key.key_size(), KeySize::Aes256);

        let mut sink = item.open_output_sink().unwrap();
        sink.write_all(b"strong").unwrap();
        drop(sink);
        assert_eq!(item.read_all().unwrap().unwrap(), b"strong");
    }

    #[test]
    fn test_tracker_registration() {
        let temp = TempDir::new().unwrap();
        let tracker = Arc::new(FileCleaningTracker::new());
        let factory = EncryptedItemFactory::new(8, Some(temp.path().to_path_buf()))
            .with_tracker(tracker.clone());

        let mut item = factory.create_item("file", None, false, Some("big.bin")).unwrap();
        assert_eq!(tracker.tracked_count(), 1);

        let mut sink = item.open_output_sink().unwrap();
        sink.write_all(&[0u8; 64]).unwrap();
        drop(sink);

        // Owner still alive, nothing to reap
        assert_eq!(tracker.reap(), 0);
        assert!(item.temp_file().exists());

        drop(item);
        assert_eq!(tracker.reap(), 1);
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn test_from_config() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.size_threshold = 1234;
        config.storage.repository = Some(temp.path().to_path_buf());
        config.encryption.key_size = KeySize::Aes192;

        let factory = EncryptedItemFactory::from_config(&config);

        assert_eq!(factory.size_threshold(), 1234);
        assert_eq!(factory.repository(), Some(temp.path()));
        assert_eq!(factory.key_size(), KeySize::Aes192);
    }
}
