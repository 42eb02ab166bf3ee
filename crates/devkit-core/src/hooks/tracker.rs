use crate::error::Result;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// FileKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Php,
    Js,
    Other,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "php" => FileKind::Php,
            "js" | "ts" | "tsx" | "jsx" | "vue" => FileKind::Js,
            _ => FileKind::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile {
    pub path: PathBuf,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FileKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionFiles {
    #[serde(default)]
    files: Vec<TrackedFile>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// SessionTracker
// ---------------------------------------------------------------------------

/// Files written during one agent session, kept in `<session>/files.json`.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    session_dir: PathBuf,
    file: PathBuf,
}

impl SessionTracker {
    /// Fails for ids that are not a plain slug; `clear` removes the resolved
    /// directory wholesale, so it must stay inside `sessions_dir`.
    pub fn new(sessions_dir: &Path, session_id: &str) -> Result<Self> {
        let session_dir = paths::session_dir(sessions_dir, session_id)?;
        let file = session_dir.join(paths::SESSION_FILES);
        Ok(Self { session_dir, file })
    }

    /// Record `path` once. Returns false if it was already tracked.
    pub fn add_file(&self, path: &Path, kind: Option<FileKind>) -> Result<bool> {
        let normalized = normalize(path);
        let mut data = self.load();
        if data.files.iter().any(|f| f.path == normalized) {
            return Ok(false);
        }
        data.files.push(TrackedFile {
            path: normalized,
            kind,
        });
        self.save(&data)?;
        Ok(true)
    }

    /// Tracked paths in insertion order, optionally limited to one kind.
    pub fn files(&self, kind: Option<FileKind>) -> Vec<PathBuf> {
        self.load()
            .files
            .into_iter()
            .filter(|f| kind.is_none() || f.kind == kind)
            .map(|f| f.path)
            .collect()
    }

    /// Paths grouped by kind; untyped entries count as `Other`.
    pub fn files_by_kind(&self) -> BTreeMap<&'static str, Vec<PathBuf>> {
        let mut out: BTreeMap<&'static str, Vec<PathBuf>> = BTreeMap::new();
        for key in ["php", "js", "other"] {
            out.insert(key, Vec::new());
        }
        for f in self.load().files {
            let key = match f.kind.unwrap_or(FileKind::Other) {
                FileKind::Php => "php",
                FileKind::Js => "js",
                FileKind::Other => "other",
            };
            out.entry(key).or_default().push(f.path);
        }
        out
    }

    pub fn set_metadata(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut data = self.load();
        data.metadata.insert(key.to_string(), value);
        self.save(&data)
    }

    pub fn metadata(&self, key: &str) -> Option<serde_json::Value> {
        self.load().metadata.remove(key)
    }

    /// Remove the whole session directory.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.session_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn load(&self) -> SessionFiles {
        let Ok(data) = std::fs::read_to_string(&self.file) else {
            return SessionFiles::default();
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            tracing::warn!(file = %self.file.display(), error = %e, "ignoring corrupt session file list");
            SessionFiles::default()
        })
    }

    fn save(&self, data: &SessionFiles) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        io::atomic_write(&self.file, &json)
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
