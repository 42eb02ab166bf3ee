use crate::output::{print_json, write_table};
use anyhow::Context;
use chrono::{Local, Utc};
use clap::Subcommand;
use devkit_core::config::Config;
use devkit_core::format::{elapsed_secs, format_duration};
use devkit_core::queue::{CancelToken, Queue, QueueGuard, QueueSnapshot};
use devkit_core::DevkitError;
use std::io::Write;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;
#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// How long a signalled child gets to exit before it is killed.
const CHILD_GRACE: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// Wait for the queue, run a command, and record the outcome in history
    Run {
        /// Queue name (default from config, usually "test")
        #[arg(long)]
        name: Option<String>,
        /// Seconds to wait for the lock before exiting with status 75
        #[arg(long)]
        timeout: Option<u64>,
        /// Label shown in status and history (default: the command line)
        #[arg(long)]
        label: Option<String>,
        /// Command to run, e.g. `-- php artisan test --parallel`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show waiting/running entries and recent runs
    Status {
        /// Queue name
        #[arg(long)]
        name: Option<String>,
        /// Number of history entries to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Remove entries left behind by processes that no longer exist
    Prune {
        /// Queue name
        #[arg(long)]
        name: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// QueueExit: typed exit codes carried through anyhow
// ---------------------------------------------------------------------------

/// Non-zero exit that `main` turns into a process exit status verbatim.
#[derive(Debug)]
pub enum QueueExit {
    /// Could not get the lock (75 on timeout, errno otherwise).
    Lock { code: i32, message: String },
    /// The wrapped command exited non-zero; its output already explains why.
    Command(i32),
    /// SIGINT/SIGTERM arrived before our turn came (128 + signal).
    Interrupted(i32),
}

impl QueueExit {
    pub fn code(&self) -> i32 {
        match self {
            QueueExit::Lock { code, .. } => *code,
            QueueExit::Command(code) | QueueExit::Interrupted(code) => *code,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            QueueExit::Lock { message, .. } => Some(message),
            QueueExit::Command(_) => None,
            QueueExit::Interrupted(_) => Some("interrupted while waiting for the queue"),
        }
    }
}

impl std::fmt::Display for QueueExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueExit::Lock { message, .. } => f.write_str(message),
            QueueExit::Command(code) => write!(f, "command exited with code {code}"),
            QueueExit::Interrupted(code) => {
                write!(f, "interrupted while waiting for the queue (exit {code})")
            }
        }
    }
}

impl std::error::Error for QueueExit {}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: QueueSubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    match subcmd {
        QueueSubcommand::Run {
            name,
            timeout,
            label,
            command,
        } => {
            let name = name.unwrap_or(config.queue.default_name.clone());
            let timeout =
                Duration::from_secs(timeout.unwrap_or(config.queue.default_timeout_secs));
            run_queued(root, &name, timeout, label, &command)
        }
        QueueSubcommand::Status { name, limit } => {
            let name = name.unwrap_or(config.queue.default_name.clone());
            status(root, &name, limit.unwrap_or(config.queue.history_limit), json)
        }
        QueueSubcommand::Prune { name } => {
            let name = name.unwrap_or(config.queue.default_name);
            prune(root, &name, json)
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn run_queued(
    root: &Path,
    name: &str,
    timeout: Duration,
    label: Option<String>,
    command: &[String],
) -> anyhow::Result<()> {
    let queue = Queue::open(root, name)?;
    let label = label.unwrap_or_else(|| display_command(command));
    let (program, args) = command.split_first().context("no command given to run")?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(queued_run(&queue, name, timeout, label, program, args))
}

async fn queued_run(
    queue: &Queue,
    name: &str,
    timeout: Duration,
    label: String,
    program: &str,
    args: &[String],
) -> anyhow::Result<()> {
    // Listeners go in before we join the queue: from here on an interrupt
    // unwinds through the status-file guard instead of killing us.
    let mut signals = ShutdownSignals::install();

    let guard = match wait_for_turn(queue, name, timeout, label, &mut signals).await? {
        Turn::Ready(guard) => guard,
        Turn::Interrupted(signal) => {
            return Err(QueueExit::Interrupted(128 + signal).into());
        }
    };

    // If spawning fails the guard drops here: status removed, no history.
    let code = run_child(program, args, &mut signals).await?;

    let entry = guard.release(code).context("failed to record run in history")?;
    tracing::info!(
        queue = name,
        exit_code = code,
        duration = %format_duration(entry.duration_secs),
        "queued run finished"
    );

    if code != 0 {
        return Err(QueueExit::Command(code).into());
    }
    Ok(())
}

enum Turn {
    Ready(QueueGuard),
    Interrupted(i32),
}

/// Join the queue on the blocking pool and race the wait against signals.
async fn wait_for_turn(
    queue: &Queue,
    name: &str,
    timeout: Duration,
    label: String,
    signals: &mut ShutdownSignals,
) -> anyhow::Result<Turn> {
    let cancel = CancelToken::new();
    let mut acquiring = {
        let queue = queue.clone();
        let cancel = cancel.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            queue.acquire_cancellable(timeout, &label, &cancel, |snapshot| {
                announce_wait(&name, timeout, snapshot)
            })
        })
    };

    let acquired = tokio::select! {
        joined = &mut acquiring => joined.context("queue wait task failed")?,
        signal = signals.recv() => {
            cancel.cancel();
            tracing::warn!(signal, "interrupted while waiting for the queue");
            // The wait returns promptly once cancelled; a lock won in the
            // meantime is handed straight back by dropping its guard.
            match acquiring.await.context("queue wait task failed")? {
                Ok(_unused) => {}
                Err(DevkitError::Interrupted { .. }) => {}
                Err(e) => tracing::warn!(error = %e, "queue wait ended with an error"),
            }
            return Ok(Turn::Interrupted(signal));
        }
    };

    match acquired {
        Ok(guard) => Ok(Turn::Ready(guard)),
        Err(e @ (DevkitError::LockTimeout { .. } | DevkitError::Lock { .. })) => {
            if matches!(e, DevkitError::LockTimeout { .. }) {
                if let Ok(snapshot) = queue.status(0) {
                    let _ = render_snapshot(&mut std::io::stderr().lock(), name, &snapshot);
                }
            }
            Err(QueueExit::Lock {
                code: e.exit_code(),
                message: e.to_string(),
            }
            .into())
        }
        Err(e) => Err(e).context("failed to join queue"),
    }
}

fn announce_wait(name: &str, timeout: Duration, snapshot: &QueueSnapshot) {
    let mut err = std::io::stderr().lock();
    let _ = writeln!(
        err,
        "Queue '{name}' is busy, waiting up to {}...",
        format_duration(timeout.as_secs())
    );
    let _ = render_snapshot(&mut err, name, snapshot);
}

/// Run the command to completion, relaying SIGINT/SIGTERM so the queue entry
/// is always released. Returns the exit status to record.
async fn run_child(
    program: &str,
    args: &[String],
    signals: &mut ShutdownSignals,
) -> anyhow::Result<i32> {
    let mut child = tokio::process::Command::new(program)
        .args(args)
        .spawn()
        .with_context(|| format!("failed to start '{program}'"))?;

    tokio::select! {
        status = child.wait() => Ok(exit_code(status?)),
        signal = signals.recv() => {
            tracing::warn!(signal, "interrupted, stopping command");
            forward_signal(&child, signal);
            match tokio::time::timeout(CHILD_GRACE, child.wait()).await {
                Ok(status) => {
                    status?;
                }
                Err(_) => child.kill().await?,
            }
            Ok(128 + signal)
        }
    }
}

/// SIGINT/SIGTERM listeners for the whole run.
#[cfg(unix)]
struct ShutdownSignals {
    listeners: Option<(Signal, Signal)>,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Self {
        let listeners = signal(SignalKind::interrupt())
            .and_then(|sigint| Ok((sigint, signal(SignalKind::terminate())?)));
        match listeners {
            Ok(listeners) => Self {
                listeners: Some(listeners),
            },
            Err(e) => {
                tracing::warn!(error = %e, "signal handling unavailable");
                Self { listeners: None }
            }
        }
    }

    /// Number of the next SIGINT or SIGTERM. Never resolves without listeners.
    async fn recv(&mut self) -> i32 {
        match &mut self.listeners {
            Some((sigint, sigterm)) => tokio::select! {
                _ = sigint.recv() => libc::SIGINT,
                _ = sigterm.recv() => libc::SIGTERM,
            },
            None => std::future::pending().await,
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Self {
        Self
    }

    async fn recv(&mut self) -> i32 {
        match tokio::signal::ctrl_c().await {
            Ok(()) => 2,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Terminal-generated SIGINT already reaches the child through the process
/// group; SIGTERM aimed at us alone has to be passed on.
#[cfg(unix)]
fn forward_signal(child: &tokio::process::Child, signal: i32) {
    if signal != libc::SIGTERM {
        return;
    }
    if let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) {
        // SAFETY: plain kill(2) on a child we spawned and have not reaped.
        unsafe {
            libc::kill(pid, signal);
        }
    }
}

#[cfg(not(unix))]
fn forward_signal(_child: &tokio::process::Child, _signal: i32) {}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

/// Command line as a shell user would have typed it.
fn display_command(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| {
            let needs_quotes = arg.is_empty()
                || arg
                    .chars()
                    .any(|c| c.is_whitespace() || c == '\'' || c == '"');
            if needs_quotes {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn status(root: &Path, name: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let queue = Queue::open(root, name)?;
    let snapshot = queue.status(limit).context("failed to read queue state")?;

    if json {
        let value = serde_json::json!({
            "name": name,
            "active": snapshot.active,
            "history": snapshot.history,
        });
        return print_json(&value);
    }

    render_snapshot(&mut std::io::stdout().lock(), name, &snapshot)?;
    Ok(())
}

fn render_snapshot(
    out: &mut dyn Write,
    name: &str,
    snapshot: &QueueSnapshot,
) -> std::io::Result<()> {
    let now = Utc::now();

    if snapshot.active.is_empty() {
        writeln!(out, "Queue '{name}' is idle.")?;
    } else {
        let running = usize::from(snapshot.running().is_some());
        let waiting = snapshot.waiting().count();
        writeln!(out, "Queue '{name}': {running} running, {waiting} waiting")?;
        writeln!(out)?;
        let rows: Vec<Vec<String>> = snapshot
            .active
            .iter()
            .map(|r| {
                vec![
                    r.pid.to_string(),
                    r.state.to_string(),
                    format_duration(r.elapsed_secs(now)),
                    r.command.clone(),
                ]
            })
            .collect();
        write_table(out, &["PID", "STATE", "ELAPSED", "COMMAND"], &rows)?;
    }

    if snapshot.history.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "Recent runs:")?;
    let rows: Vec<Vec<String>> = snapshot
        .history
        .iter()
        .map(|h| {
            vec![
                h.finished_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                h.exit_code.to_string(),
                format_duration(h.wait_secs),
                format_duration(h.duration_secs),
                format!("{} ago", format_duration(elapsed_secs(h.finished_at, now))),
                h.command.clone(),
            ]
        })
        .collect();
    write_table(
        out,
        &["FINISHED", "EXIT", "WAIT", "DURATION", "AGE", "COMMAND"],
        &rows,
    )
}

// ---------------------------------------------------------------------------
// prune
// ---------------------------------------------------------------------------

fn prune(root: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let queue = Queue::open(root, name)?;
    let removed = queue
        .cleanup_stale()
        .context("failed to prune queue entries")?;

    if json {
        return print_json(&serde_json::json!({ "name": name, "removed": removed }));
    }
    let noun = if removed == 1 { "entry" } else { "entries" };
    println!("Removed {removed} stale {noun} from queue '{name}'.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
