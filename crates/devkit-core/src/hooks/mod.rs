//! Bookkeeping for agent-session hooks.
//!
//! Hooks receive one JSON object on stdin per event. They append a readable
//! trail to `<sessions>/<session_id>/hooks.log` and remember which source
//! files were written during the session in `<sessions>/<session_id>/files.json`.
//! The checks in [`checks`] run against those files and may print a block
//! decision for the agent.

pub mod checks;
pub mod input;
pub mod log;
pub mod summary;
pub mod tracker;

pub use checks::{BlockDecision, TurnOutcome};
pub use input::HookInput;
pub use log::{HookLog, LogLevel};
pub use summary::tool_summary;
pub use tracker::{FileKind, SessionTracker};
