use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Open (creating if needed) the lock file. The returned handle owns the
/// advisory lock once one of the lock functions succeeds on it; closing the
/// handle releases it.
pub(crate) fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

/// Try to take an exclusive `flock` without blocking.
///
/// Returns `Ok(true)` on success and `Ok(false)` when another open file
/// description holds the lock.
pub(crate) fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

/// Block in `flock(LOCK_EX)` until the lock is ours. Retries on `EINTR`.
fn lock_exclusive(file: &File) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        loop {
            // SAFETY: `file` owns a valid descriptor for the duration of the call.
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(())
    }
}

/// How a bounded lock wait ended.
#[derive(Debug)]
pub(crate) enum LockWait {
    Locked(File),
    TimedOut,
    Cancelled,
}

enum Wake {
    Locked(io::Result<File>),
    Cancelled,
}

/// Lets another thread (a signal handler, typically) abandon a lock wait.
///
/// Cancelling before the wait starts makes the wait return immediately.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Mutex<CancelState>>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    waiter: Option<SyncSender<Wake>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut state = self.state();
        state.cancelled = true;
        if let Some(tx) = state.waiter.take() {
            let _ = tx.try_send(Wake::Cancelled);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    /// Returns false when already cancelled.
    fn register(&self, tx: SyncSender<Wake>) -> bool {
        let mut state = self.state();
        if state.cancelled {
            return false;
        }
        state.waiter = Some(tx);
        true
    }

    fn unregister(&self) {
        self.state().waiter = None;
    }

    fn state(&self) -> MutexGuard<'_, CancelState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wait for an exclusive lock on `path` for at most `timeout`, or until
/// `cancel` fires.
///
/// The blocking `flock` runs on a helper thread against its own descriptor and
/// hands the locked file back over a channel. A helper that wins the lock
/// after the caller gave up finds the channel closed (or its message never
/// read) and drops its handle, which releases the lock again.
pub(crate) fn lock_exclusive_timeout(
    path: &Path,
    timeout: Duration,
    cancel: &CancelToken,
) -> io::Result<LockWait> {
    let file = open_lock_file(path)?;
    // Room for both a lock result and a cancellation, so neither sender blocks.
    let (tx, rx) = mpsc::sync_channel::<Wake>(2);
    if !cancel.register(tx.clone()) {
        return Ok(LockWait::Cancelled);
    }

    let spawned = std::thread::Builder::new()
        .name("queue-lock-wait".to_string())
        .spawn(move || {
            let outcome = lock_exclusive(&file).map(|()| file);
            let _ = tx.send(Wake::Locked(outcome));
        });
    if let Err(e) = spawned {
        cancel.unregister();
        return Err(e);
    }

    let result = match rx.recv_timeout(timeout) {
        Ok(Wake::Locked(Ok(file))) => Ok(LockWait::Locked(file)),
        Ok(Wake::Locked(Err(e))) => Err(e),
        Ok(Wake::Cancelled) => Ok(LockWait::Cancelled),
        Err(mpsc::RecvTimeoutError::Timeout) => Ok(LockWait::TimedOut),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(io::Error::other(
            "lock wait thread exited without a result",
        )),
    };
    cancel.unregister();
    result
}
