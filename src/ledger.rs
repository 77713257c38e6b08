//! Registry of temporary filesystem resources pending cleanup.
//!
//! The ledger is one explicit object created at process start and cloned
//! into every pipeline step and into the interrupt handler. Every mutation
//! runs inside a single critical section, so teardown always observes a
//! consistent snapshot: a path is either fully registered or not at all.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the process-wide resource ledger
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    inner: Arc<Mutex<LedgerInner>>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

/// Point-in-time copy of the ledger contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Pending files, in registration order
    pub files: Vec<PathBuf>,
    /// Pending directories, in registration order
    pub dirs: Vec<PathBuf>,
}

impl LedgerSnapshot {
    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

/// What a teardown pass actually removed
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Files deleted (already-missing files are not counted)
    pub files_removed: usize,
    /// Directories removed
    pub dirs_removed: usize,
    /// Paths that could not be removed, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

impl Ledger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // A panic while holding the lock cannot leave a half-applied entry,
        // so a poisoned ledger is still usable for teardown.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a temporary file
    pub fn register_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut inner = self.lock();
        if !inner.files.contains(&path) {
            log::debug!("ledger: tracking file {}", path.display());
            inner.files.push(path);
        }
    }

    /// Track a temporary directory
    pub fn register_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut inner = self.lock();
        if !inner.dirs.contains(&path) {
            log::debug!("ledger: tracking directory {}", path.display());
            inner.dirs.push(path);
        }
    }

    /// Stop tracking a path without deleting it (ownership moves to the caller).
    ///
    /// Returns true if the path was tracked.
    pub fn release(&self, path: &Path) -> bool {
        let mut inner = self.lock();
        let before = inner.files.len() + inner.dirs.len();
        inner.files.retain(|p| p != path);
        inner.dirs.retain(|p| p != path);
        let released = inner.files.len() + inner.dirs.len() < before;
        if released {
            log::debug!("ledger: released {}", path.display());
        }
        released
    }

    /// Whether the path is currently tracked
    pub fn contains(&self, path: &Path) -> bool {
        let inner = self.lock();
        inner.files.iter().any(|p| p == path) || inner.dirs.iter().any(|p| p == path)
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.lock();
        LedgerSnapshot {
            files: inner.files.clone(),
            dirs: inner.dirs.clone(),
        }
    }

    /// Delete every tracked resource and clear the ledger.
    ///
    /// Missing files are fine, directory removal errors are recorded and
    /// skipped. Safe to call on an empty or partially drained ledger.
    pub fn teardown_all(&self) -> TeardownReport {
        let snapshot = {
            let mut inner = self.lock();
            LedgerSnapshot {
                files: std::mem::take(&mut inner.files),
                dirs: std::mem::take(&mut inner.dirs),
            }
        };

        let mut report = TeardownReport::default();

        for file in &snapshot.files {
            match std::fs::remove_file(file) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("Failed to remove {}: {}", file.display(), e);
                    report.failures.push((file.clone(), e.to_string()));
                }
            }
        }

        for dir in &snapshot.dirs {
            if !dir.exists() {
                continue;
            }
            match std::fs::remove_dir_all(dir) {
                Ok(()) => report.dirs_removed += 1,
                Err(e) => {
                    log::warn!("Failed to remove directory {}: {}", dir.display(), e);
                    report.failures.push((dir.clone(), e.to_string()));
                }
            }
        }

        report
    }
}
