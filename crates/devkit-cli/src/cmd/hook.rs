use clap::Subcommand;
use devkit_core::config::{Config, HooksConfig};
use devkit_core::hooks::checks::{self, BlockDecision, TurnOutcome};
use devkit_core::hooks::{tool_summary, FileKind, HookInput, HookLog, SessionTracker};
use std::io::Read;
use std::path::Path;

/// Tracker metadata key counting consecutive failed end-of-turn checks.
const FAILURES_KEY: &str = "end_of_turn_failures";

const RULES_REMINDER: &str = "🔄 The conversation has been compacted. Please re-read ALL \
relevant rules from `.claude/rules/` to ensure you continue following project conventions \
correctly. This includes backend rules, frontend rules, and data class patterns.";

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookEvent {
    /// A new agent session began
    SessionStart,
    /// The user submitted a prompt
    UserPrompt,
    /// A tool is about to run
    PreToolUse,
    /// A Write/Edit tool finished
    AfterWrite,
    /// The agent finished responding
    Stop,
    /// Format and analyse the files written this session
    EndOfTurn,
    /// The conversation is about to be compacted
    PreCompact,
}

impl HookEvent {
    /// Name used in the hook log's `[hook]` column.
    fn log_name(self) -> &'static str {
        match self {
            HookEvent::SessionStart => "session-start",
            HookEvent::UserPrompt => "user-prompt",
            HookEvent::PreToolUse => "tool",
            HookEvent::AfterWrite => "after-write",
            HookEvent::Stop => "stop",
            HookEvent::EndOfTurn => "end-of-turn",
            HookEvent::PreCompact => "remind-rules",
        }
    }
}

struct HookContext<'a> {
    root: &'a Path,
    sessions: &'a Path,
    hooks: &'a HooksConfig,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Hooks never fail the agent's tool call: every error ends up in the hook
/// log and the process still exits 0. Anything meant for the agent (a block
/// decision, a reminder) goes to stdout.
pub fn run(root: &Path, event: HookEvent) -> anyhow::Result<()> {
    let config = Config::load(root).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "config unreadable, using defaults");
        Config::default()
    });
    let sessions = config.hooks.sessions_path(root);

    let mut raw = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut raw) {
        HookLog::fallback(&sessions, event.log_name())
            .error("Failed to read hook input", Some(&e.to_string()));
        return Ok(());
    }

    let input = match HookInput::parse(&raw) {
        Ok(input) => input,
        Err(e) => {
            HookLog::fallback(&sessions, event.log_name())
                .error("Failed to parse hook input JSON", Some(&e.to_string()));
            return Ok(());
        }
    };

    let ctx = HookContext {
        root,
        sessions: &sessions,
        hooks: &config.hooks,
    };
    if let Some(reply) = handle(&ctx, event, &input) {
        println!("{reply}");
    }
    Ok(())
}

/// Returns what to print for the agent, if anything.
fn handle(ctx: &HookContext<'_>, event: HookEvent, input: &HookInput) -> Option<String> {
    let name = event.log_name();
    let session_id = input.session_id.as_deref().filter(|id| !id.is_empty());
    let log = match session_id {
        Some(id) => match HookLog::for_session(ctx.sessions, name, id) {
            Ok(log) => log,
            Err(e) => {
                HookLog::fallback(ctx.sessions, name)
                    .error("Rejected hook input", Some(&e.to_string()));
                return None;
            }
        },
        None => HookLog::fallback(ctx.sessions, name),
    };

    let project = input.cwd.as_deref().unwrap_or(ctx.root);
    let project = std::fs::canonicalize(project).unwrap_or_else(|_| project.to_path_buf());

    match event {
        HookEvent::SessionStart => {
            session_start(&project, input, &log);
            None
        }
        HookEvent::UserPrompt => {
            log.separator();
            log.info(&format!("User: {}", input.prompt.as_deref().unwrap_or_default()));
            None
        }
        HookEvent::PreToolUse => {
            let tool = input.tool_name.as_deref().unwrap_or("unknown");
            log.info(&tool_summary(tool, &input.tool_input));
            None
        }
        HookEvent::AfterWrite => after_write(ctx, &project, session_id, input, &log),
        HookEvent::Stop => {
            if input.stop_hook_active {
                log.info("Agent finished responding (stop_hook_active=true)");
            } else {
                log.info("Agent finished responding");
            }
            None
        }
        HookEvent::EndOfTurn => end_of_turn(ctx, &project, session_id, input, &log),
        HookEvent::PreCompact => {
            log.info("Compaction detected - sending rules reminder");
            log.success("Rules reminder sent");
            Some(RULES_REMINDER.to_string())
        }
    }
}

fn session_start(project: &Path, input: &HookInput, log: &HookLog) {
    log.info("Session started");
    if let Some(cwd) = &input.cwd {
        log.info(&format!("Working directory: {}", cwd.display()));
    }
    let tools = checks::available_tools(project);
    if !tools.is_empty() {
        log.info(&format!("Available tools: {}", tools.join(", ")));
    }
    if project.join("node_modules").is_dir() {
        log.info("Node modules available for JS/TS linting");
    }
    log.success("Session initialized successfully");
}

/// Remember php/js sources written this session so end-of-turn checks can
/// target them, and syntax-check PHP right away. Writes that left no file
/// behind are ignored.
fn after_write(
    ctx: &HookContext<'_>,
    project: &Path,
    session_id: Option<&str>,
    input: &HookInput,
    log: &HookLog,
) -> Option<String> {
    let path = input.resolved_file_path()?;
    let path = std::fs::canonicalize(&path).ok()?;
    let kind = FileKind::of(&path);
    if kind == FileKind::Other {
        return None;
    }

    if let Some(id) = session_id {
        track(ctx.sessions, id, &path, kind, log);
    }
    if kind != FileKind::Php {
        return None;
    }
    let block = checks::php_lint(&ctx.hooks.php_binary, project, &path, log)?;
    reply(&block, log)
}

fn track(sessions: &Path, session_id: &str, path: &Path, kind: FileKind, log: &HookLog) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let added = SessionTracker::new(sessions, session_id)
        .and_then(|tracker| tracker.add_file(path, Some(kind)));
    match added {
        Ok(true) => log.info(&format!("Tracked {name}")),
        Ok(false) => {}
        Err(e) => log.error(&format!("Failed to track {name}"), Some(&e.to_string())),
    }
}

fn end_of_turn(
    ctx: &HookContext<'_>,
    project: &Path,
    session_id: Option<&str>,
    input: &HookInput,
    log: &HookLog,
) -> Option<String> {
    log.separator();
    // Our own block re-triggers the stop event; don't loop on it.
    if input.stop_hook_active {
        log.info("Stop hook already active, skipping to prevent loop");
        return None;
    }
    let Some(id) = session_id else {
        log.warning("No session_id provided", None);
        return None;
    };
    let tracker = match SessionTracker::new(ctx.sessions, id) {
        Ok(tracker) => tracker,
        Err(e) => {
            log.error("Failed to open session files", Some(&e.to_string()));
            return None;
        }
    };
    log.info(&format!(
        "Running end-of-turn checks for session {}...",
        &id[..id.len().min(8)]
    ));

    match checks::end_of_turn(project, &tracker, log) {
        TurnOutcome::NothingToCheck => None,
        TurnOutcome::Passed => {
            if let Err(e) = tracker.clear() {
                log.warning("Failed to clear session files", Some(&e.to_string()));
            }
            log.success("All end-of-turn checks passed");
            None
        }
        TurnOutcome::Failed(report) => {
            let attempt = tracker
                .metadata(FAILURES_KEY)
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
                + 1;
            if let Err(e) = tracker.set_metadata(FAILURES_KEY, attempt.into()) {
                log.warning("Failed to record check attempt", Some(&e.to_string()));
            }
            log.error(
                &format!("End-of-turn checks failed (attempt {attempt})"),
                None,
            );
            reply(&checks::end_of_turn_block(&report), log)
        }
    }
}

fn reply(block: &BlockDecision, log: &HookLog) -> Option<String> {
    match serde_json::to_string(block) {
        Ok(json) => Some(json),
        Err(e) => {
            log.error("Failed to encode block decision", Some(&e.to_string()));
            None
        }
    }
}
