//! Cross-process run queue.
//!
//! A queue serializes invocations of one named command (typically the test
//! suite) across shells. Coordination is a single advisory `flock` on
//! `queue.lock`; visibility comes from one JSON status file per waiting or
//! running process, and every completed run is appended to `history.jsonl`.
//!
//! ```text
//! .devkit/queue/<name>/
//!   queue.lock        flock target, never written
//!   status/<pid>.json StatusRecord, whole-file replaced
//!   history.jsonl     HistoryEntry per line, append-only
//! ```
//!
//! The kernel drops the flock when the holder's descriptor closes, so a crashed
//! holder never wedges the queue. Its status file lingers until
//! [`Queue::cleanup_stale`] notices the dead PID; `status` runs that cleanup
//! before reporting.

mod lock;
pub mod process;
pub mod record;

pub use lock::CancelToken;
pub use record::{read_history, HistoryEntry, QueueSnapshot, QueueState, StatusRecord};

use crate::error::{DevkitError, Result};
use crate::{io, paths};
use chrono::Utc;
use lock::LockWait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// History entries included in the snapshot handed to a contention observer.
const CONTENTION_HISTORY: usize = 5;

// ---------------------------------------------------------------------------
// QueuePaths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePaths {
    pub lock_file: PathBuf,
    pub status_dir: PathBuf,
    pub history_file: PathBuf,
}

impl QueuePaths {
    /// Standard layout inside a single queue directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            lock_file: dir.join(paths::LOCK_FILE),
            status_dir: dir.join(paths::STATUS_DIR),
            history_file: dir.join(paths::HISTORY_FILE),
        }
    }

    /// Layout for queue `name` under a project root.
    pub fn for_queue(root: &Path, name: &str) -> Result<Self> {
        paths::validate_queue_name(name)?;
        Ok(Self::in_dir(&paths::queue_dir(root, name)))
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Queue {
    paths: QueuePaths,
}

impl Queue {
    pub fn new(paths: QueuePaths) -> Self {
        Self { paths }
    }

    pub fn open(root: &Path, name: &str) -> Result<Self> {
        Ok(Self::new(QueuePaths::for_queue(root, name)?))
    }

    pub fn paths(&self) -> &QueuePaths {
        &self.paths
    }

    /// Wait up to `timeout` for the queue lock. See [`Queue::acquire_with`].
    pub fn acquire(&self, timeout: Duration, command: &str) -> Result<QueueGuard> {
        self.acquire_with(timeout, command, |_| {})
    }

    /// [`Queue::acquire_cancellable`] with a token nobody cancels.
    pub fn acquire_with<F>(
        &self,
        timeout: Duration,
        command: &str,
        on_contended: F,
    ) -> Result<QueueGuard>
    where
        F: FnOnce(&QueueSnapshot),
    {
        self.acquire_cancellable(timeout, command, &CancelToken::new(), on_contended)
    }

    /// Register as waiting, take the lock, and mark this process running.
    ///
    /// When the lock is already held, `on_contended` receives the current
    /// queue state once before the blocking wait starts. On timeout the
    /// waiting record is removed and [`DevkitError::LockTimeout`] returned;
    /// when `cancel` fires first the record is removed and
    /// [`DevkitError::Interrupted`] returned.
    pub fn acquire_cancellable<F>(
        &self,
        timeout: Duration,
        command: &str,
        cancel: &CancelToken,
        on_contended: F,
    ) -> Result<QueueGuard>
    where
        F: FnOnce(&QueueSnapshot),
    {
        io::ensure_dir(&self.paths.status_dir)?;

        let mut record = StatusRecord::waiting(process::current_pid(), command);
        record.save(&self.paths.status_dir)?;
        // From here on, any early return removes the waiting record.
        let status = StatusFile {
            path: paths::status_file(&self.paths.status_dir, record.pid),
        };

        let started = Instant::now();
        let file =
            lock::open_lock_file(&self.paths.lock_file).map_err(|e| self.lock_error(e))?;
        let file = match lock::try_lock_exclusive(&file) {
            Ok(true) => file,
            Ok(false) => {
                drop(file);
                tracing::debug!(pid = record.pid, "queue lock busy, waiting");
                on_contended(&self.status(CONTENTION_HISTORY)?);
                match lock::lock_exclusive_timeout(&self.paths.lock_file, timeout, cancel) {
                    Ok(LockWait::Locked(file)) => file,
                    Ok(LockWait::TimedOut) => {
                        return Err(DevkitError::LockTimeout {
                            lock_file: self.paths.lock_file.clone(),
                            waited_secs: started.elapsed().as_secs(),
                        })
                    }
                    Ok(LockWait::Cancelled) => {
                        tracing::debug!(pid = record.pid, "queue wait cancelled");
                        return Err(DevkitError::Interrupted {
                            lock_file: self.paths.lock_file.clone(),
                        });
                    }
                    Err(e) => return Err(self.lock_error(e)),
                }
            }
            Err(e) => return Err(self.lock_error(e)),
        };

        record.mark_running();
        record.save(&self.paths.status_dir)?;
        tracing::debug!(
            pid = record.pid,
            waited_ms = started.elapsed().as_millis() as u64,
            "queue lock acquired"
        );

        Ok(QueueGuard {
            record,
            status,
            history_file: self.paths.history_file.clone(),
            _lock: file,
        })
    }

    /// Live entries (after pruning dead PIDs) and the last `history_limit`
    /// completed runs.
    pub fn status(&self, history_limit: usize) -> Result<QueueSnapshot> {
        self.cleanup_stale()?;
        let mut active = self.load_records()?;
        active.sort_by_key(|r| r.queued_at);
        let history = read_history(&self.paths.history_file, history_limit)?;
        Ok(QueueSnapshot { active, history })
    }

    /// Remove status files whose owner is gone or whose content is unreadable.
    /// Returns how many files were removed.
    pub fn cleanup_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.status_files()? {
            let stale = match StatusRecord::load(&path) {
                Ok(rec) => {
                    let dead = !process::is_pid_alive(rec.pid);
                    if dead {
                        tracing::warn!(
                            pid = rec.pid,
                            state = %rec.state,
                            "pruning stale queue entry"
                        );
                    }
                    dead
                }
                Err(DevkitError::CorruptRecord { reason, .. }) => {
                    tracing::warn!(
                        file = %path.display(),
                        %reason,
                        "pruning corrupt queue entry"
                    );
                    true
                }
                // Released between listing and reading.
                Err(DevkitError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(e),
            };
            if stale && io::remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn status_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.paths.status_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn load_records(&self) -> Result<Vec<StatusRecord>> {
        let mut records = Vec::new();
        for path in self.status_files()? {
            match StatusRecord::load(&path) {
                Ok(rec) => records.push(rec),
                Err(DevkitError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(DevkitError::CorruptRecord { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    fn lock_error(&self, source: std::io::Error) -> DevkitError {
        tracing::error!(
            lock_file = %self.paths.lock_file.display(),
            error = %source,
            "queue lock failed"
        );
        DevkitError::Lock {
            lock_file: self.paths.lock_file.clone(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// QueueGuard
// ---------------------------------------------------------------------------

/// Proof of holding the queue lock.
///
/// [`QueueGuard::release`] records the run in history. Dropping the guard
/// without releasing (panic, early `?`) still removes the status file and
/// closes the lock, but writes no history.
#[derive(Debug)]
pub struct QueueGuard {
    record: StatusRecord,
    // Field order is drop order: the status file goes before the lock closes,
    // so the next holder never sees our `running` entry.
    status: StatusFile,
    history_file: PathBuf,
    _lock: File,
}

impl QueueGuard {
    pub fn record(&self) -> &StatusRecord {
        &self.record
    }

    pub fn status_file(&self) -> &Path {
        &self.status.path
    }

    /// Append exactly one history entry for this run and give up the lock.
    pub fn release(self, exit_code: i32) -> Result<HistoryEntry> {
        let entry = HistoryEntry::from_record(&self.record, Utc::now(), exit_code);
        entry.append(&self.history_file)?;
        tracing::debug!(
            pid = entry.pid,
            exit_code,
            duration_secs = entry.duration_secs,
            "queue lock released"
        );
        Ok(entry)
    }
}

/// Removes a status file when dropped.
#[derive(Debug)]
struct StatusFile {
    path: PathBuf,
}

impl Drop for StatusFile {
    fn drop(&mut self) {
        if let Err(e) = io::remove_if_exists(&self.path) {
            tracing::warn!(
                file = %self.path.display(),
                error = %e,
                "failed to remove status file"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
