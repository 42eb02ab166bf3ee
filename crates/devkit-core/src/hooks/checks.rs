//! Project checks run from hooks.
//!
//! After a write, PHP files get a `php -l` syntax check. At the end of a turn
//! the files tracked for the session go through Pint (formatting, never
//! blocking), PHPStan (whole project) and `eslint --fix`. Every tool is a
//! plain subprocess with captured output and a deadline; a tool the project
//! does not have installed is skipped.

use crate::error::Result;
use crate::format::format_elapsed;
use crate::hooks::log::HookLog;
use crate::hooks::tracker::SessionTracker;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

pub const PHP_LINT_TIMEOUT: Duration = Duration::from_secs(10);
pub const PINT_TIMEOUT: Duration = Duration::from_secs(60);
pub const PHPSTAN_TIMEOUT: Duration = Duration::from_secs(180);
pub const ESLINT_TIMEOUT: Duration = Duration::from_secs(60);

const PINT_BIN: &str = "vendor/bin/pint";
const PHPSTAN_BIN: &str = "vendor/bin/phpstan";
const ESLINT_BIN: &str = "node_modules/.bin/eslint";

/// Project-local tools reported when a session starts.
pub const PROJECT_TOOLS: [(&str, &str); 3] = [
    ("pint", PINT_BIN),
    ("phpstan", PHPSTAN_BIN),
    ("rector", "vendor/bin/rector"),
];

// ---------------------------------------------------------------------------
// Hook decision
// ---------------------------------------------------------------------------

/// JSON a hook prints on stdout to stop the agent and hand it `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDecision {
    decision: &'static str,
    pub reason: String,
}

impl BlockDecision {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            decision: "block",
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Subprocess runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CheckOutput {
    /// `None` when the process was killed by a signal or timed out.
    pub code: Option<i32>,
    /// stdout followed by stderr, trimmed.
    pub output: String,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl CheckOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `program` in `cwd` with captured output, killing it after `timeout`.
///
/// Failing to start the program is an error; everything after that,
/// including the deadline passing, is reported in the returned output.
pub fn run_check(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<CheckOutput> {
    let started = Instant::now();
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel::<std::io::Result<Output>>();
    std::thread::Builder::new()
        .name("hook-check".to_string())
        .spawn(move || {
            let _ = tx.send(child.wait_with_output());
        })?;

    match rx.recv_timeout(timeout) {
        Ok(output) => {
            let output = output?;
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok(CheckOutput {
                code: output.status.code(),
                output: text.trim().to_string(),
                elapsed: started.elapsed(),
                timed_out: false,
            })
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(program = %program.display(), pid, "check timed out, killing it");
            kill(pid);
            Ok(CheckOutput {
                code: None,
                output: "Command timed out".to_string(),
                elapsed: started.elapsed(),
                timed_out: true,
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(std::io::Error::other(
            "check wait thread exited without a result",
        )
        .into()),
    }
}

#[cfg(unix)]
fn kill(pid: u32) {
    if let Ok(pid) = i32::try_from(pid) {
        // SAFETY: kill(2) on our own child; the waiter thread reaps it.
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill(_pid: u32) {}

// ---------------------------------------------------------------------------
// Tool discovery
// ---------------------------------------------------------------------------

/// `project/rel` when it is an executable file.
pub fn project_tool(project: &Path, rel: &str) -> Option<PathBuf> {
    let path = project.join(rel);
    is_executable(&path).then_some(path)
}

/// Names from [`PROJECT_TOOLS`] installed in `project`.
pub fn available_tools(project: &Path) -> Vec<&'static str> {
    PROJECT_TOOLS
        .iter()
        .filter(|(_, rel)| project_tool(project, rel).is_some())
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Existing files as paths relative to `project` where possible.
fn relative_existing(project: &Path, files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter(|f| project.join(f).exists())
        .map(|f| {
            f.strip_prefix(project)
                .unwrap_or(f)
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// php -l
// ---------------------------------------------------------------------------

/// Syntax-check one PHP file with `php -l`.
///
/// Returns the block decision to print when the file does not parse. A
/// missing `php` binary is logged and treated as nothing to report.
pub fn php_lint(php: &str, project: &Path, file: &Path, log: &HookLog) -> Option<BlockDecision> {
    let name = file_name(file);
    let Ok(php) = which::which(php) else {
        log.warning(&format!("Skipped syntax check for {name}: '{php}' not found"), None);
        return None;
    };
    let rel = file.strip_prefix(project).unwrap_or(file);
    let args = vec!["-l".to_string(), rel.to_string_lossy().into_owned()];

    let result = match run_check(&php, &args, project, PHP_LINT_TIMEOUT) {
        Ok(result) => result,
        Err(e) => {
            log.warning(&format!("Skipped syntax check for {name}: {e}"), None);
            return None;
        }
    };
    if result.success() {
        log.success(&format!("Syntax OK: {name}"));
        return None;
    }

    log.error(&format!("PHP syntax error in {name}"), Some(&result.output));
    Some(BlockDecision::new(format!(
        "PHP syntax error in {name}:\n{}\n\nPlease fix the syntax error.",
        result.output
    )))
}

// ---------------------------------------------------------------------------
// End of turn
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No PHP or JS sources were written this session.
    NothingToCheck,
    Passed,
    /// Report listing each failing tool's output.
    Failed(String),
}

/// Run the end-of-turn checks over the files `tracker` recorded.
pub fn end_of_turn(project: &Path, tracker: &SessionTracker, log: &HookLog) -> TurnOutcome {
    let mut by_kind = tracker.files_by_kind();
    let php = by_kind.remove("php").unwrap_or_default();
    let js = by_kind.remove("js").unwrap_or_default();

    if php.is_empty() && js.is_empty() {
        log.info("No PHP/JS files modified this session");
        return TurnOutcome::NothingToCheck;
    }
    log.info(&format!(
        "Found {} PHP and {} JS/TS/Vue files",
        php.len(),
        js.len()
    ));

    let mut errors = Vec::new();
    if !php.is_empty() {
        run_pint(project, &php, log);
        if let Some(output) = run_phpstan(project, log) {
            errors.push(format!("PHPStan errors:\n{output}"));
        }
    }
    if !js.is_empty() {
        if let Some(output) = run_eslint(project, &js, log) {
            errors.push(format!("ESLint errors:\n{output}"));
        }
    }

    if errors.is_empty() {
        TurnOutcome::Passed
    } else {
        TurnOutcome::Failed(errors.join("\n\n"))
    }
}

/// Reason handed to the agent when end-of-turn checks fail.
pub fn end_of_turn_block(report: &str) -> BlockDecision {
    BlockDecision::new(format!(
        "End-of-turn checks found issues:\n\n{report}\n\nPlease fix these issues before continuing."
    ))
}

/// Format in place. Findings are logged but never block.
fn run_pint(project: &Path, files: &[PathBuf], log: &HookLog) {
    let Some(pint) = project_tool(project, PINT_BIN) else {
        return;
    };
    let rel = relative_existing(project, files);
    if rel.is_empty() {
        return;
    }
    log.info(&format!("[START] Pint on {} PHP file(s)", rel.len()));
    match run_check(&pint, &rel, project, PINT_TIMEOUT) {
        Ok(r) if r.success() => log.success(&format!(
            "[DONE] Pint formatting complete ({})",
            format_elapsed(r.elapsed)
        )),
        Ok(r) => log.warning(
            &format!("[DONE] Pint had issues ({})", format_elapsed(r.elapsed)),
            Some(&r.output),
        ),
        Err(e) => log.warning(&format!("Pint failed to start: {e}"), None),
    }
}

/// Whole-project analysis, since an edit can break callers elsewhere.
/// Returns the output to report when PHPStan found errors.
fn run_phpstan(project: &Path, log: &HookLog) -> Option<String> {
    let phpstan = project_tool(project, PHPSTAN_BIN)?;
    log.info("[START] PHPStan on entire project");
    let args = ["analyse", "--no-progress", "--error-format=table"].map(String::from);
    let result = match run_check(&phpstan, &args, project, PHPSTAN_TIMEOUT) {
        Ok(result) => result,
        Err(e) => {
            log.warning(&format!("PHPStan failed to start: {e}"), None);
            return None;
        }
    };
    let elapsed = format_elapsed(result.elapsed);

    // A non-zero exit without error lines is a crash or config problem, not
    // something the agent can fix in its own code.
    let reported_errors =
        result.output.contains("[ERROR]") || result.output.to_lowercase().contains(" error");
    if !result.success() && reported_errors {
        log.error(
            &format!("[DONE] PHPStan found issues ({elapsed})"),
            Some(&result.output),
        );
        return Some(result.output);
    }
    log.success(&format!("[DONE] PHPStan passed ({elapsed})"));
    None
}

/// `eslint --fix`; whatever it cannot fix is returned for the report.
fn run_eslint(project: &Path, files: &[PathBuf], log: &HookLog) -> Option<String> {
    let eslint = project_tool(project, ESLINT_BIN)?;
    let rel = relative_existing(project, files);
    if rel.is_empty() {
        return None;
    }
    log.info(&format!(
        "[START] ESLint --fix on {} JS/TS/Vue file(s)",
        rel.len()
    ));
    let mut args = vec!["--fix".to_string()];
    args.extend(rel);
    let result = match run_check(&eslint, &args, project, ESLINT_TIMEOUT) {
        Ok(result) => result,
        Err(e) => {
            log.warning(&format!("ESLint failed to start: {e}"), None);
            return None;
        }
    };
    let elapsed = format_elapsed(result.elapsed);

    if !result.success() && !result.output.is_empty() {
        log.error(
            &format!("[DONE] ESLint found unfixable issues ({elapsed})"),
            Some(&result.output),
        );
        return Some(result.output);
    }
    log.success(&format!("[DONE] ESLint passed ({elapsed})"));
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
