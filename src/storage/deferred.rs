//! Threshold-switching memory/disk storage

use crate::error::Result;
use crate::storage::BufferedStorage;
use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-process part of temp file names
static PROCESS_UID: OnceLock<String> = OnceLock::new();

/// Per-process temp file counter
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_temp_name() -> String {
    let uid = PROCESS_UID.get_or_init(|| Uuid::new_v4().simple().to_string());
    let id = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("upload_{}_{:08}.tmp", uid, id)
}

enum Content {
    /// Nothing written, or the cache was cleared
    Empty,
    Memory(Vec<u8>),
    /// Content lives in the temp file
    Disk,
}

/// Storage that keeps small content in memory and spills large content to disk
///
/// Content stays in memory while its total length is at most the threshold.
/// The first write that would take it past the threshold moves everything
/// into a temp file under the repository directory.
pub struct DeferredStorage {
    /// Max bytes held in memory
    threshold: usize,
    /// Temp file used once the threshold is crossed
    temp_path: PathBuf,
    content: Content,
}

impl DeferredStorage {
    /// Create empty storage; `None` puts temp files in the system temp directory
    pub fn new(threshold: usize, repository: Option<&Path>) -> Self {
        let dir = repository
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);

        DeferredStorage {
            threshold,
            temp_path: dir.join(next_temp_name()),
            content: Content::Empty,
        }
    }

    /// Max bytes held in memory
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Temp file this storage spills to, whether or not it exists yet
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Length of the temp file; a missing file counts as empty
    fn disk_length(&self) -> io::Result<u64> {
        match fs::metadata(&self.temp_path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn remove_temp_file(&self) -> io::Result<bool> {
        match fs::remove_file(&self.temp_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl BufferedStorage for DeferredStorage {
    /// Starts over: previous content is discarded
    fn open_raw_output_sink(&mut self) -> Result<Box<dyn Write + '_>> {
        if matches!(self.content, Content::Disk) {
            self.remove_temp_file()?;
        }
        self.content = Content::Memory(Vec::new());

        Ok(Box::new(DeferredSink {
            storage: self,
            file: None,
        }))
    }

    fn open_raw_input_source(&self) -> Result<Box<dyn Read + '_>> {
        let source: Box<dyn Read + '_> = match &self.content {
            Content::Empty => Box::new(io::empty()),
            Content::Memory(data) => Box::new(data.as_slice()),
            Content::Disk => Box::new(BufReader::new(File::open(&self.temp_path)?)),
        };
        Ok(source)
    }

    fn raw_contents(&self) -> Result<Option<Cow<'_, [u8]>>> {
        match &self.content {
            Content::Empty => Ok(None),
            Content::Memory(data) => Ok(Some(Cow::Borrowed(data.as_slice()))),
            Content::Disk => match fs::read(&self.temp_path) {
                Ok(data) => Ok(Some(Cow::Owned(data))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn raw_length(&self) -> u64 {
        match &self.content {
            Content::Empty => 0,
            Content::Memory(data) => data.len() as u64,
            Content::Disk => self.disk_length().unwrap_or_else(|e| {
                warn!("Failed to stat temp file {}: {}", self.temp_path.display(), e);
                0
            }),
        }
    }

    fn is_in_memory(&self) -> bool {
        !matches!(self.content, Content::Disk)
    }

    fn raw_storage_path(&self) -> Option<&Path> {
        match self.content {
            Content::Disk => Some(&self.temp_path),
            _ => None,
        }
    }

    fn clear_cache(&mut self) {
        if let Content::Memory(_) = self.content {
            self.content = Content::Empty;
        }
    }
}

impl Drop for DeferredStorage {
    fn drop(&mut self) {
        match self.remove_temp_file() {
            Ok(true) => debug!("Deleted temp file {}", self.temp_path.display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to delete temp file {}: {}", self.temp_path.display(), e),
        }
    }
}

/// Write pass over a `DeferredStorage`
struct DeferredSink<'a> {
    storage: &'a mut DeferredStorage,
    /// Open once the threshold has been crossed
    file: Option<File>,
}

impl DeferredSink<'_> {
    /// Move buffered bytes into the temp file and keep writing there
    fn spill(&mut self) -> io::Result<&mut File> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.storage.temp_path)?;

        if let Content::Memory(data) = &self.storage.content {
            file.write_all(data)?;
        }
        self.storage.content = Content::Disk;

        debug!(
            "Threshold of {} bytes exceeded, spilled to {}",
            self.storage.threshold,
            self.storage.temp_path.display()
        );
        Ok(self.file.insert(file))
    }
}

impl Write for DeferredSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.file.as_mut() {
            return file.write(buf);
        }

        let threshold = self.storage.threshold;
        if let Content::Memory(data) = &mut self.storage.content {
            if data.len() + buf.len() <= threshold {
                data.extend_from_slice(buf);
                return Ok(buf.len());
            }
        }

        self.spill()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
