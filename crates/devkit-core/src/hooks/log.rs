use crate::error::Result;
use crate::{io, paths};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Append-only, human-readable trail of hook activity for one session.
///
/// Write failures are reported through `tracing` and otherwise swallowed:
/// a hook must never fail because its log could not be written.
#[derive(Debug, Clone)]
pub struct HookLog {
    hook: String,
    file: PathBuf,
}

impl HookLog {
    /// Log for `hook` in `session_id`'s directory.
    pub fn for_session(sessions_dir: &Path, hook: &str, session_id: &str) -> Result<Self> {
        let file = paths::session_dir(sessions_dir, session_id)?.join(paths::HOOK_LOG_FILE);
        Ok(Self {
            hook: hook.to_string(),
            file,
        })
    }

    /// Shared log directly under `sessions_dir`, for events that cannot be
    /// tied to a session.
    pub fn fallback(sessions_dir: &Path, hook: &str) -> Self {
        Self {
            hook: hook.to_string(),
            file: sessions_dir.join(paths::HOOK_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn write(&self, level: LogLevel, message: &str, details: Option<&str>) -> Result<()> {
        let entry = format_entry(Local::now(), level, &self.hook, message, details);
        io::append_line(&self.file, &entry)
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Success, message, None);
    }

    pub fn warning(&self, message: &str, details: Option<&str>) {
        self.log(LogLevel::Warning, message, details);
    }

    pub fn error(&self, message: &str, details: Option<&str>) {
        self.log(LogLevel::Error, message, details);
    }

    pub fn separator(&self) {
        if let Err(e) = io::append_line(&self.file, &"-".repeat(80)) {
            tracing::warn!(file = %self.file.display(), error = %e, "failed to write hook log");
        }
    }

    fn log(&self, level: LogLevel, message: &str, details: Option<&str>) {
        if let Err(e) = self.write(level, message, details) {
            tracing::warn!(file = %self.file.display(), error = %e, "failed to write hook log");
        }
    }
}

/// `[2026-01-02 03:04:05] [INFO] [hook] message`, details indented 4 spaces
/// on the following lines.
fn format_entry(
    at: DateTime<Local>,
    level: LogLevel,
    hook: &str,
    message: &str,
    details: Option<&str>,
) -> String {
    let mut entry = format!(
        "[{}] [{}] [{}] {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        level.as_str(),
        hook,
        message
    );
    if let Some(details) = details {
        for line in details.trim().lines() {
            entry.push_str("\n    ");
            entry.push_str(line);
        }
    }
    entry
}
