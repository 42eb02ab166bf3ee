use crate::console::ConsoleMessage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("{method} {path} failed with status {status}: {body}")]
    Request {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("login did not leave {login_path} within {timeout_ms}ms (still at {url})")]
    LoginTimeout {
        login_path: String,
        url: String,
        timeout_ms: u64,
    },

    #[error("page logged {} console error(s):\n{}", .0.len(), render_messages(.0))]
    ConsoleErrors(Vec<ConsoleMessage>),
}

fn render_messages(messages: &[ConsoleMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("  - {m}"))
        .collect::<Vec<_>>()
        .join("\n")
}
