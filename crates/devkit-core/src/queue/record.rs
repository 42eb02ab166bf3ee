use crate::error::{DevkitError, Result};
use crate::format::elapsed_secs;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// QueueState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Waiting,
    Running,
}

impl QueueState {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueState::Waiting => "waiting",
            QueueState::Running => "running",
        }
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StatusRecord
// ---------------------------------------------------------------------------

/// One process that is waiting for, or holding, a queue lock.
/// Persisted as `status/<pid>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub pid: u32,
    pub state: QueueState,
    pub command: String,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn waiting(pid: u32, command: impl Into<String>) -> Self {
        Self {
            pid,
            state: QueueState::Waiting,
            command: command.into(),
            queued_at: Utc::now(),
            started_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = QueueState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| DevkitError::CorruptRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Whole-file replace of `status/<pid>.json`.
    pub fn save(&self, status_dir: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        io::atomic_write(&paths::status_file(status_dir, self.pid), &data)
    }

    /// Seconds this entry has spent in its current state.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        elapsed_secs(self.started_at.unwrap_or(self.queued_at), now)
    }
}

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

/// One completed run, appended as a JSON line to `history.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub pid: u32,
    pub command: String,
    pub queued_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wait_secs: u64,
    pub duration_secs: u64,
    pub exit_code: i32,
}

impl HistoryEntry {
    pub fn from_record(record: &StatusRecord, finished_at: DateTime<Utc>, exit_code: i32) -> Self {
        let started_at = record.started_at.unwrap_or(record.queued_at);
        Self {
            pid: record.pid,
            command: record.command.clone(),
            queued_at: record.queued_at,
            started_at,
            finished_at,
            wait_secs: elapsed_secs(record.queued_at, started_at),
            duration_secs: elapsed_secs(started_at, finished_at),
            exit_code,
        }
    }

    pub fn append(&self, history_file: &Path) -> Result<()> {
        let line = serde_json::to_string(self)?;
        io::append_line(history_file, &line)
    }
}

/// Read the last `limit` entries of a history file, oldest first.
///
/// Lines that fail to parse are skipped; a missing file is an empty history.
pub fn read_history(history_file: &Path, limit: usize) -> Result<Vec<HistoryEntry>> {
    let data = match std::fs::read_to_string(history_file) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries: Vec<HistoryEntry> = Vec::new();
    for (n, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(
                file = %history_file.display(),
                line = n + 1,
                error = %e,
                "skipping unreadable history line"
            ),
        }
    }

    let skip = entries.len().saturating_sub(limit);
    Ok(entries.split_off(skip))
}

// ---------------------------------------------------------------------------
// QueueSnapshot
// ---------------------------------------------------------------------------

/// Everything `status` reports: live entries plus recent history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub active: Vec<StatusRecord>,
    pub history: Vec<HistoryEntry>,
}

impl QueueSnapshot {
    pub fn running(&self) -> Option<&StatusRecord> {
        self.active.iter().find(|r| r.state == QueueState::Running)
    }

    pub fn waiting(&self) -> impl Iterator<Item = &StatusRecord> {
        self.active.iter().filter(|r| r.state == QueueState::Waiting)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
