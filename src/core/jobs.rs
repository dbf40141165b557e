//! Background jobs: cooperative cancellation, the per-library single-flight
//! lease, and a handle for jobs running on a worker thread.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use fs2::FileExt;
use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::LibraryError;
use crate::core::layout::Library;

/// Cancellation flag shared between a running scan or rebuild and whoever
/// started it. The engine polls it between directories and batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LibraryError::Cancelled.into())
        } else {
            Ok(())
        }
    }
}

/// Who holds a lease, written next to the lock file for diagnostics only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Local>,
}

/// Exclusive right to scan or rebuild one library.
///
/// Backed by an OS advisory lock on `<library>/.pm_system/job.lock`, so a
/// process that dies without running `Drop` (Ctrl-C, crash) frees it.
#[derive(Debug)]
pub struct LibraryLease {
    _file: File,
    lock_path: PathBuf,
    holder_path: PathBuf,
}

impl LibraryLease {
    pub fn acquire(library: &Library) -> Result<Self> {
        library.ensure_system_dir()?;
        Self::acquire_at(&library.lock_path(), library.root())
    }

    pub fn acquire_at(lock_path: &Path, root: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| miette::miette!("cannot open {}: {}", lock_path.display(), e))?;

        // fs2's method, not the std one of the same name
        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if !is_contended(&e) {
                return Err(miette::miette!("cannot lock {}: {}", lock_path.display(), e));
            }
            if let Some(holder) = Self::holder(lock_path) {
                debug!("lease held by pid {} since {}", holder.pid, holder.acquired_at);
            }
            return Err(LibraryError::Busy {
                root: root.to_path_buf(),
                lock: lock_path.to_path_buf(),
            }
            .into());
        }

        let holder_path = holder_path_for(lock_path);
        let holder = LeaseHolder {
            pid: std::process::id(),
            acquired_at: Local::now(),
        };
        if let Err(e) = serde_json::to_vec_pretty(&holder)
            .map_err(std::io::Error::other)
            .and_then(|payload| fs::write(&holder_path, payload))
        {
            warn!("could not write {}: {}", holder_path.display(), e);
        }

        info!("acquired library lease {}", lock_path.display());
        Ok(Self {
            _file: file,
            lock_path: lock_path.to_path_buf(),
            holder_path,
        })
    }

    /// Last recorded holder of the lease at `lock_path`. A leftover record
    /// from a killed process does not mean the lease is held.
    pub fn holder(lock_path: &Path) -> Option<LeaseHolder> {
        let raw = fs::read_to_string(holder_path_for(lock_path)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for LibraryLease {
    fn drop(&mut self) {
        debug!("releasing library lease {}", self.lock_path.display());
        if let Err(e) = fs::remove_file(&self.holder_path) {
            debug!("failed to remove {}: {}", self.holder_path.display(), e);
        }
        // Closing the file releases the lock
    }
}

fn holder_path_for(lock_path: &Path) -> PathBuf {
    let mut name = lock_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Progress of a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

/// What a job body receives: its cancellation token and a progress sink
pub struct JobContext {
    cancel: CancellationToken,
    progress: Sender<Progress>,
}

impl JobContext {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn report(&self, done: usize, total: usize) {
        // The handle may already be gone; progress is best effort
        let _ = self.progress.send(Progress { done, total });
    }
}

/// Handle to a job running on a worker thread
pub struct JobHandle<T> {
    cancel: CancellationToken,
    progress: Receiver<Progress>,
    thread: JoinHandle<Result<T>>,
}

impl<T> JobHandle<T> {
    /// Next progress event if one is waiting
    pub fn try_progress(&self) -> Option<Progress> {
        match self.progress.try_recv() {
            Ok(p) => Some(p),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking iterator over progress events; ends when the job finishes
    pub fn progress_iter(&self) -> impl Iterator<Item = Progress> + '_ {
        self.progress.iter()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the job and return its result
    pub fn wait(self) -> Result<T> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => Err(miette::miette!("background job panicked")),
        }
    }
}

/// Run `job` on a worker thread while holding `lease`.
///
/// The lease is released when the job returns, whether it succeeded or not.
pub fn submit<T, F>(lease: LibraryLease, job: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&JobContext) -> Result<T> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel();
    let ctx = JobContext {
        cancel: cancel.clone(),
        progress: tx,
    };

    let thread = thread::spawn(move || {
        let _lease = lease;
        job(&ctx)
    });

    JobHandle {
        cancel,
        progress: rx,
        thread,
    }
}
