use crate::error::{DevkitError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DEVKIT_DIR: &str = ".devkit";
pub const QUEUE_DIR: &str = ".devkit/queue";
pub const CONFIG_FILE: &str = ".devkit/config.yaml";

pub const LOCK_FILE: &str = "queue.lock";
pub const STATUS_DIR: &str = "status";
pub const HISTORY_FILE: &str = "history.jsonl";

pub const HOOK_LOG_FILE: &str = "hooks.log";
pub const SESSION_FILES: &str = "files.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn queue_dir(root: &Path, name: &str) -> PathBuf {
    root.join(QUEUE_DIR).join(name)
}

pub fn status_file(status_dir: &Path, pid: u32) -> PathBuf {
    status_dir.join(format!("{pid}.json"))
}

/// `<sessions>/<session_id>`. The id arrives from hook stdin, so it is checked
/// before it is allowed anywhere near a path.
pub fn session_dir(sessions_dir: &Path, session_id: &str) -> Result<PathBuf> {
    validate_session_id(session_id)?;
    Ok(sessions_dir.join(session_id))
}

// ---------------------------------------------------------------------------
// Queue name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Queue names become directory names, so they are restricted to slugs.
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !name_re().is_match(name) {
        return Err(DevkitError::InvalidQueueName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session id validation
// ---------------------------------------------------------------------------

static SESSION_RE: OnceLock<Regex> = OnceLock::new();

fn session_re() -> &'static Regex {
    SESSION_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

/// Session ids name a directory of their own: no separators, no dots.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.len() > 128 || !session_re().is_match(id) {
        return Err(DevkitError::InvalidSessionId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
