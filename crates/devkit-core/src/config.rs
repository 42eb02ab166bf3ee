use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue used when `--name` is not given.
    #[serde(default = "default_queue_name")]
    pub default_name: String,
    /// Seconds to wait for the lock before giving up.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Number of history entries shown by `queue status`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_queue_name() -> String {
    "test".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_history_limit() -> usize {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_name: default_queue_name(),
            default_timeout_secs: default_timeout_secs(),
            history_limit: default_history_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// HooksConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Directory holding one sub-directory per agent session, relative to the
    /// project root unless absolute.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    /// Interpreter used for `php -l` after writes; looked up on PATH.
    #[serde(default = "default_php_binary")]
    pub php_binary: String,
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from(".claude/sessions")
}

fn default_php_binary() -> String {
    "php".to_string()
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            php_binary: default_php_binary(),
        }
    }
}

impl HooksConfig {
    pub fn sessions_path(&self, root: &Path) -> PathBuf {
        if self.sessions_dir.is_absolute() {
            self.sessions_dir.clone()
        } else {
            root.join(&self.sessions_dir)
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl Config {
    /// Load `.devkit/config.yaml`, falling back to defaults when the file does
    /// not exist. A present but malformed file is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if paths::validate_queue_name(&self.queue.default_name).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "queue.default_name '{}' is not a valid queue name",
                    self.queue.default_name
                ),
            });
        }

        if self.queue.default_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "queue.default_timeout_secs is 0: contended runs fail immediately"
                    .to_string(),
            });
        }

        if self.queue.history_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "queue.history_limit is 0: status never shows recent runs".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
