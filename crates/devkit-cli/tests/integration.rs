#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn devkit(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("devkit").unwrap();
    cmd.current_dir(dir.path()).env("DEVKIT_ROOT", dir.path());
    cmd
}

/// Start `devkit queue run` in the background.
fn spawn_queued(dir: &TempDir, args: &[&str]) -> Child {
    std::process::Command::new(assert_cmd::cargo::cargo_bin("devkit"))
        .current_dir(dir.path())
        .env("DEVKIT_ROOT", dir.path())
        .args(["queue", "run"])
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn status_json(dir: &TempDir) -> serde_json::Value {
    let out = devkit(dir)
        .args(["queue", "status", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    serde_json::from_slice(&out.stdout).unwrap()
}

fn wait_until_running(dir: &TempDir) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = status_json(dir);
        let running = status["active"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r["state"] == "running");
        if running {
            return;
        }
        assert!(Instant::now() < deadline, "queue never reported a running entry");
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn history_lines(dir: &Path) -> usize {
    std::fs::read_to_string(dir.join(".devkit/queue/test/history.jsonl"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// devkit queue run
// ---------------------------------------------------------------------------

#[test]
fn run_success_records_history() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "run", "--", "sh", "-c", "echo hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));

    let status = status_json(&dir);
    assert!(status["active"].as_array().unwrap().is_empty());
    let history = status["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["exit_code"], 0);
    assert_eq!(history[0]["command"], "sh -c 'echo hello'");
}

#[test]
fn run_propagates_command_exit_code() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "run", "--", "sh", "-c", "exit 3"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error:").not());

    let status = status_json(&dir);
    assert_eq!(status["history"][0]["exit_code"], 3);
}

#[test]
fn run_uses_label_when_given() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "run", "--label", "unit suite", "--", "true"])
        .assert()
        .success();
    assert_eq!(status_json(&dir)["history"][0]["command"], "unit suite");
}

#[test]
fn run_missing_program_fails_without_history() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "run", "--", "devkit-test-no-such-program"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to start"));

    let status = status_json(&dir);
    assert!(status["active"].as_array().unwrap().is_empty());
    assert!(status["history"].as_array().unwrap().is_empty());
}

#[test]
fn history_has_one_line_per_run() {
    let dir = TempDir::new().unwrap();
    for code in ["0", "1", "0"] {
        let _ = devkit(&dir)
            .args(["queue", "run", "--", "sh", "-c", &format!("exit {code}")])
            .assert();
    }
    assert_eq!(history_lines(dir.path()), 3);
}

#[test]
fn invalid_queue_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "run", "--name", "../escape", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid queue name"));
}

#[test]
fn lock_timeout_exits_75() {
    let dir = TempDir::new().unwrap();
    let mut holder = spawn_queued(&dir, &["--", "sleep", "3"]);
    wait_until_running(&dir);

    devkit(&dir)
        .args(["queue", "run", "--timeout", "1", "--", "true"])
        .assert()
        .code(75)
        .stderr(predicate::str::contains("busy"))
        .stderr(predicate::str::contains("timed out"));

    // The timed-out waiter left nothing behind.
    let status = status_json(&dir);
    assert_eq!(status["active"].as_array().unwrap().len(), 1);

    assert!(holder.wait().unwrap().success());
    assert_eq!(history_lines(dir.path()), 1);
}

#[test]
fn concurrent_runs_never_overlap() {
    let dir = TempDir::new().unwrap();
    // mkdir fails if another run is inside its critical section.
    let critical = "mkdir \"$0/inside\" && sleep 0.2 && rmdir \"$0/inside\"";
    let root = dir.path().to_string_lossy().to_string();

    let mut children = Vec::new();
    for i in 0..4u64 {
        std::thread::sleep(Duration::from_millis(i * 17 % 40));
        children.push(spawn_queued(
            &dir,
            &["--timeout", "30", "--", "sh", "-c", critical, &root],
        ));
    }
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }
    assert_eq!(history_lines(dir.path()), 4);
}

#[cfg(unix)]
#[test]
fn killed_holder_does_not_block_the_queue() {
    let dir = TempDir::new().unwrap();
    let mut holder = spawn_queued(&dir, &["--", "sleep", "5"]);
    wait_until_running(&dir);

    holder.kill().unwrap();
    holder.wait().unwrap();

    devkit(&dir)
        .args(["queue", "run", "--timeout", "5", "--", "true"])
        .assert()
        .success();

    let status = status_json(&dir);
    assert!(status["active"].as_array().unwrap().is_empty());
}

#[cfg(unix)]
fn send_signal(child: &Child, signal: i32) {
    // SAFETY: kill(2) on a child we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(child.id() as i32, signal) };
    assert_eq!(rc, 0, "kill failed");
}

#[cfg(unix)]
fn wait_until_waiting(dir: &TempDir, pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = status_json(dir);
        let waiting = status["active"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r["pid"] == pid && r["state"] == "waiting");
        if waiting {
            return;
        }
        assert!(Instant::now() < deadline, "pid {pid} never showed up as waiting");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(unix)]
#[test]
fn sigint_while_waiting_removes_status_entry() {
    let dir = TempDir::new().unwrap();
    let mut holder = spawn_queued(&dir, &["--", "sleep", "3"]);
    wait_until_running(&dir);

    let mut waiter = spawn_queued(&dir, &["--timeout", "30", "--", "true"]);
    wait_until_waiting(&dir, waiter.id());
    send_signal(&waiter, libc::SIGINT);

    let status = waiter.wait().unwrap();
    assert_eq!(status.code(), Some(130));
    let own_status = dir
        .path()
        .join(format!(".devkit/queue/test/status/{}.json", waiter.id()));
    assert!(!own_status.exists(), "waiting record left behind");

    assert!(holder.wait().unwrap().success());
    // Only the holder's run reaches history.
    assert_eq!(history_lines(dir.path()), 1);
    assert!(status_json(&dir)["active"].as_array().unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn sigterm_stops_command_and_records_143() {
    let dir = TempDir::new().unwrap();
    let mut run = spawn_queued(&dir, &["--", "sleep", "30"]);
    wait_until_running(&dir);

    let started = Instant::now();
    send_signal(&run, libc::SIGTERM);
    let status = run.wait().unwrap();
    assert_eq!(status.code(), Some(143));
    assert!(started.elapsed() < Duration::from_secs(10));

    let status = status_json(&dir);
    assert!(status["active"].as_array().unwrap().is_empty());
    assert_eq!(status["history"][0]["exit_code"], 143);
}

// ---------------------------------------------------------------------------
// devkit queue status / prune
// ---------------------------------------------------------------------------

#[test]
fn status_of_fresh_queue_is_idle() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Queue 'test' is idle."));
}

#[test]
fn status_shows_recent_runs() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["queue", "run", "--label", "phpunit", "--", "true"])
        .assert()
        .success();
    devkit(&dir)
        .args(["queue", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recent runs:"))
        .stdout(predicate::str::contains("phpunit"));
}

#[cfg(unix)]
#[test]
fn prune_removes_dead_entries() {
    let dir = TempDir::new().unwrap();
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead = child.id();
    child.wait().unwrap();

    let status_dir = dir.path().join(".devkit/queue/test/status");
    std::fs::create_dir_all(&status_dir).unwrap();
    std::fs::write(
        status_dir.join(format!("{dead}.json")),
        serde_json::json!({
            "pid": dead,
            "state": "running",
            "command": "ghost",
            "queued_at": "2026-01-01T00:00:00Z",
            "started_at": "2026-01-01T00:00:01Z",
        })
        .to_string(),
    )
    .unwrap();

    devkit(&dir)
        .args(["queue", "prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 stale entry"));
    assert!(!status_dir.join(format!("{dead}.json")).exists());
}

// ---------------------------------------------------------------------------
// devkit config
// ---------------------------------------------------------------------------

#[test]
fn config_overrides_default_queue() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".devkit")).unwrap();
    std::fs::write(
        dir.path().join(".devkit/config.yaml"),
        "queue:\n  default_name: e2e\n",
    )
    .unwrap();

    devkit(&dir)
        .args(["queue", "run", "--", "true"])
        .assert()
        .success();
    assert!(dir.path().join(".devkit/queue/e2e/history.jsonl").exists());

    devkit(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_name: e2e"));
}

#[test]
fn config_validate_fails_on_errors() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".devkit")).unwrap();
    std::fs::write(
        dir.path().join(".devkit/config.yaml"),
        "queue:\n  default_name: Bad Name\n",
    )
    .unwrap();

    devkit(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error: queue.default_name"));
}

// ---------------------------------------------------------------------------
// devkit hook
// ---------------------------------------------------------------------------

#[test]
fn hook_pre_tool_use_logs_to_session() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["hook", "pre-tool-use"])
        .write_stdin(r#"{"session_id":"abc123","tool_name":"Read","tool_input":{"file_path":"/p/routes/web.php"}}"#)
        .assert()
        .success();

    let log =
        std::fs::read_to_string(dir.path().join(".claude/sessions/abc123/hooks.log")).unwrap();
    assert!(log.contains("[tool] Read: web.php"));
}

#[test]
fn hook_with_bad_json_still_exits_zero() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["hook", "stop"])
        .write_stdin("not json")
        .assert()
        .success();

    let log = std::fs::read_to_string(dir.path().join(".claude/sessions/hooks.log")).unwrap();
    assert!(log.contains("[ERROR] [stop] Failed to parse hook input JSON"));
}

#[test]
fn hook_after_write_tracks_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Users.vue"), "<template/>").unwrap();
    let payload = serde_json::json!({
        "session_id": "s9",
        "cwd": dir.path(),
        "tool_name": "Write",
        "tool_input": { "file_path": "Users.vue" },
    });
    devkit(&dir)
        .args(["hook", "after-write"])
        .write_stdin(payload.to_string())
        .assert()
        .success();

    let files =
        std::fs::read_to_string(dir.path().join(".claude/sessions/s9/files.json")).unwrap();
    let files: serde_json::Value = serde_json::from_str(&files).unwrap();
    assert_eq!(files["files"][0]["type"], "js");
}

#[test]
fn hook_stop_rejects_session_id_outside_sessions_dir() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    devkit(&dir)
        .env("DEVKIT_ROOT", &project)
        .args(["hook", "stop"])
        .write_stdin(r#"{"session_id":"../../../escaped"}"#)
        .assert()
        .success();

    // `.claude/sessions/../../../escaped` would land next to the project.
    assert!(!dir.path().join("escaped").exists());
    let log = std::fs::read_to_string(project.join(".claude/sessions/hooks.log")).unwrap();
    assert!(log.contains("[ERROR] [stop] Rejected hook input"));
    assert!(log.contains("invalid session id '../../../escaped'"));
}

#[test]
fn hook_pre_compact_prints_rules_reminder() {
    let dir = TempDir::new().unwrap();
    devkit(&dir)
        .args(["hook", "pre-compact"])
        .write_stdin(r#"{"session_id":"abc123"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Please re-read ALL relevant rules from `.claude/rules/`",
        ));
}

#[cfg(unix)]
#[test]
fn hook_end_of_turn_blocks_on_phpstan_errors() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let root = std::fs::canonicalize(dir.path()).unwrap();
    std::fs::create_dir_all(root.join("app")).unwrap();
    std::fs::write(root.join("app/User.php"), "<?php").unwrap();
    let phpstan = root.join("vendor/bin/phpstan");
    std::fs::create_dir_all(phpstan.parent().unwrap()).unwrap();
    std::fs::write(
        &phpstan,
        "#!/bin/sh\necho ' Line  app/User.php'\necho ' [ERROR] Found 1 error'\nexit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&phpstan, std::fs::Permissions::from_mode(0o755)).unwrap();

    let write = serde_json::json!({
        "session_id": "s1",
        "cwd": root,
        "tool_name": "Write",
        "tool_input": { "file_path": "app/User.php" },
    });
    std::fs::create_dir_all(root.join(".devkit")).unwrap();
    std::fs::write(
        root.join(".devkit/config.yaml"),
        "hooks:\n  php_binary: devkit-test-no-such-php\n",
    )
    .unwrap();
    devkit(&dir)
        .args(["hook", "after-write"])
        .write_stdin(write.to_string())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let out = devkit(&dir)
        .args(["hook", "end-of-turn"])
        .write_stdin(r#"{"session_id":"s1"}"#)
        .output()
        .unwrap();
    assert!(out.status.success());
    let reply: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(reply["decision"], "block");
    let reason = reply["reason"].as_str().unwrap();
    assert!(reason.starts_with("End-of-turn checks found issues:\n\nPHPStan errors:\n"));
    assert!(reason.contains("[ERROR] Found 1 error"));

    // With the loop guard set nothing is printed.
    devkit(&dir)
        .args(["hook", "end-of-turn"])
        .write_stdin(r#"{"session_id":"s1","stop_hook_active":true}"#)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
