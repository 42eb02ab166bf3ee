use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Payload delivered on stdin to every hook. Only the fields the hooks act on
/// are modelled; unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: serde_json::Value,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub stop_hook_active: bool,
}

impl HookInput {
    pub fn parse(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// `tool_input.file_path`, when present and non-empty.
    pub fn file_path(&self) -> Option<&str> {
        self.tool_input
            .get("file_path")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Resolve `file_path` against the session's working directory.
    pub fn resolved_file_path(&self) -> Option<PathBuf> {
        let raw = PathBuf::from(self.file_path()?);
        if raw.is_absolute() {
            return Some(raw);
        }
        match &self.cwd {
            Some(cwd) => Some(cwd.join(raw)),
            None => Some(raw),
        }
    }
}
