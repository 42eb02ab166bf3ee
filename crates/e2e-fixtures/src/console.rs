//! Browser console capture.
//!
//! A [`ConsoleCollector`] is a cheap, cloneable handle onto one shared buffer.
//! Attach it to a [`Page`] and every console message the page emits is
//! recorded with its kind, text, source location and arrival time.

use crate::error::FixtureError;
use crate::page::{ConsoleSink, Page};
use crate::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    Log,
    Debug,
    Info,
    Warning,
    Error,
    Other,
}

impl ConsoleKind {
    /// Map a driver's type string (`"warn"`, `"error"`, ...) onto a kind.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "log" => ConsoleKind::Log,
            "debug" => ConsoleKind::Debug,
            "info" => ConsoleKind::Info,
            "warn" | "warning" => ConsoleKind::Warning,
            "error" => ConsoleKind::Error,
            _ => ConsoleKind::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsoleKind::Log => "log",
            ConsoleKind::Debug => "debug",
            ConsoleKind::Info => "info",
            ConsoleKind::Warning => "warning",
            ConsoleKind::Error => "error",
            ConsoleKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub url: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub kind: ConsoleKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    pub timestamp: DateTime<Utc>,
}

impl ConsoleMessage {
    pub fn new(kind: ConsoleKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            location: None,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, url: impl Into<String>, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation {
            url: url.into(),
            line,
            column,
        });
        self
    }
}

impl std::fmt::Display for ConsoleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.text)?;
        if let Some(loc) = &self.location {
            write!(f, " ({}:{}:{})", loc.url, loc.line, loc.column)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IgnorePattern
// ---------------------------------------------------------------------------

/// Console errors matching one of these are tolerated by
/// [`ConsoleCollector::assert_no_errors`].
#[derive(Debug, Clone)]
pub enum IgnorePattern {
    Substring(String),
    Regex(Regex),
}

impl IgnorePattern {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            IgnorePattern::Substring(s) => text.contains(s.as_str()),
            IgnorePattern::Regex(re) => re.is_match(text),
        }
    }
}

impl From<&str> for IgnorePattern {
    fn from(s: &str) -> Self {
        IgnorePattern::Substring(s.to_string())
    }
}

impl From<String> for IgnorePattern {
    fn from(s: String) -> Self {
        IgnorePattern::Substring(s)
    }
}

impl From<Regex> for IgnorePattern {
    fn from(re: Regex) -> Self {
        IgnorePattern::Regex(re)
    }
}

// ---------------------------------------------------------------------------
// ConsoleCollector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ConsoleCollector {
    messages: Arc<Mutex<Vec<ConsoleMessage>>>,
}

impl ConsoleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording everything `page` logs.
    pub fn attach<P: Page + ?Sized>(&self, page: &P) {
        page.on_console(self.sink());
    }

    /// A sink writing into this collector, for drivers that are wired up by hand.
    pub fn sink(&self) -> ConsoleSink {
        let collector = self.clone();
        Arc::new(move |message| collector.record(message))
    }

    pub fn record(&self, message: ConsoleMessage) {
        self.lock().push(message);
    }

    pub fn messages(&self) -> Vec<ConsoleMessage> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<ConsoleMessage> {
        self.of_kind(ConsoleKind::Error)
    }

    pub fn warnings(&self) -> Vec<ConsoleMessage> {
        self.of_kind(ConsoleKind::Warning)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Fail with every error-level message not matched by `ignore`.
    pub fn assert_no_errors(&self, ignore: &[IgnorePattern]) -> Result<()> {
        let unexpected: Vec<ConsoleMessage> = self
            .errors()
            .into_iter()
            .filter(|m| !ignore.iter().any(|p| p.matches(&m.text)))
            .collect();
        if unexpected.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::ConsoleErrors(unexpected))
        }
    }

    fn of_kind(&self, kind: ConsoleKind) -> Vec<ConsoleMessage> {
        self.lock()
            .iter()
            .filter(|m| m.kind == kind)
            .cloned()
            .collect()
    }

    // A panicking test body must not take the buffer down with it.
    fn lock(&self) -> MutexGuard<'_, Vec<ConsoleMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
