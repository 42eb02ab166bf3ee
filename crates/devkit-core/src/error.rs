use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevkitError {
    #[error("invalid queue name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidQueueName(String),

    #[error("invalid session id '{0}': must be letters, digits, '-' or '_'")]
    InvalidSessionId(String),

    #[error("timed out after {waited_secs}s waiting for queue lock '{}'", .lock_file.display())]
    LockTimeout { lock_file: PathBuf, waited_secs: u64 },

    #[error("interrupted while waiting for queue lock '{}'", .lock_file.display())]
    Interrupted { lock_file: PathBuf },

    #[error("failed to lock '{}': {source}", .lock_file.display())]
    Lock {
        lock_file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt status record '{}': {reason}", .path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DevkitError {
    /// Process exit status a CLI should use for this error.
    ///
    /// Lock timeouts get 75 (`EX_TEMPFAIL`) so callers can tell them apart
    /// from the wrapped command's own failures. Other lock failures surface
    /// the OS errno when one is available.
    pub fn exit_code(&self) -> i32 {
        match self {
            DevkitError::LockTimeout { .. } => LOCK_TIMEOUT_EXIT_CODE,
            DevkitError::Lock { source, .. } => source.raw_os_error().unwrap_or(1),
            _ => 1,
        }
    }
}

/// Exit status reserved for "timed out waiting for the queue lock".
pub const LOCK_TIMEOUT_EXIT_CODE: i32 = 75;

pub type Result<T> = std::result::Result<T, DevkitError>;
