//! Temp file cleanup tracking
//!
//! Items delete their own temp files when dropped. The tracker is a second
//! line for files that outlive their owner, e.g. when a delete fails. It
//! never runs on its own: call [`FileCleaningTracker::reap`] periodically and
//! [`FileCleaningTracker::delete_all`] at shutdown.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// A tracked temp file and the owner keeping it alive
struct Tracked {
    path: PathBuf,
    owner: Weak<()>,
}

/// Deletes temp files whose owners have gone away
#[derive(Default)]
pub struct FileCleaningTracker {
    entries: Mutex<Vec<Tracked>>,
    /// Paths that could not be deleted
    failures: Mutex<Vec<PathBuf>>,
}

impl FileCleaningTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` until `owner` is dropped
    pub fn track(&self, path: impl AsRef<Path>, owner: &Arc<()>) {
        let path = path.as_ref().to_path_buf();
        debug!("Tracking temp file {}", path.display());
        self.entries.lock().push(Tracked {
            path,
            owner: Arc::downgrade(owner),
        });
    }

    /// Number of files currently tracked
    pub fn tracked_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Paths that could not be deleted so far
    pub fn delete_failures(&self) -> Vec<PathBuf> {
        self.failures.lock().clone()
    }

    /// Delete files whose owners are gone
    ///
    /// Returns the number of entries released. Files that fail to delete are
    /// recorded in [`delete_failures`](Self::delete_failures).
    pub fn reap(&self) -> usize {
        let dead: Vec<Tracked> = {
            let mut entries = self.entries.lock();
            let (dead, alive): (Vec<Tracked>, Vec<Tracked>) = entries
                .drain(..)
                .partition(|t| t.owner.strong_count() == 0);
            *entries = alive;
            dead
        };

        for tracked in &dead {
            self.delete(&tracked.path);
        }

        if !dead.is_empty() {
            info!("Reaped {} temp file entries", dead.len());
        }
        dead.len()
    }

    /// Delete every tracked file, whether or not its owner is alive
    ///
    /// Returns the number of files actually removed.
    pub fn delete_all(&self) -> usize {
        let entries: Vec<Tracked> = self.entries.lock().drain(..).collect();

        let removed = entries
            .iter()
            .filter(|tracked| self.delete(&tracked.path))
            .count();

        info!("Deleted {} of {} tracked temp files", removed, entries.len());
        removed
    }

    /// Returns true if a file was removed
    fn delete(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Deleted temp file {}", path.display());
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Failed to delete temp file {}: {}", path.display(), e);
                self.failures.lock().push(path.to_path_buf());
                false
            }
        }
    }
}
