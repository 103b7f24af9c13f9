//! Buffered storage for uploaded items
//!
//! Storage holds raw bytes either in memory or in a temporary file once a
//! size threshold is crossed. It knows nothing about encryption: the
//! encrypted item only wraps the streams it hands out.

mod deferred;

pub use deferred::DeferredStorage;

use crate::error::Result;
use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::Path;

/// Capabilities an encrypted item needs from its backing storage
pub trait BufferedStorage {
    /// Open a sink for a new write pass
    fn open_raw_output_sink(&mut self) -> Result<Box<dyn Write + '_>>;

    /// Open a source over everything stored so far
    fn open_raw_input_source(&self) -> Result<Box<dyn Read + '_>>;

    /// Full stored content, or `None` if nothing is cached and it can't be produced
    fn raw_contents(&self) -> Result<Option<Cow<'_, [u8]>>>;

    /// Number of raw bytes stored
    fn raw_length(&self) -> u64;

    /// Whether the content is held in memory rather than in a file
    fn is_in_memory(&self) -> bool;

    /// Backing file, if the content lives on disk
    fn raw_storage_path(&self) -> Option<&Path>;

    /// Drop any in-memory copy of the content
    fn clear_cache(&mut self);
}
