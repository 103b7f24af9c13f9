//! upcrypt - Transparent encryption for buffered uploads
//!
//! Uploaded content is encrypted on its way into memory or a temp file and
//! decrypted on the way out. Each item has its own ephemeral key, so nothing
//! written to disk is readable once the item is gone.

pub mod cleanup;
pub mod config;
pub mod crypto;
pub mod error;
pub mod item;
pub mod logging;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use item::{EncryptedItem, EncryptedItemFactory};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cleanup::FileCleaningTracker;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::item::{EncryptedItem, EncryptedItemFactory};
    pub use crate::storage::BufferedStorage;
}
