use std::io;

/// PID of the calling process.
pub fn current_pid() -> u32 {
    std::process::id()
}

/// Check whether a given PID is alive.
///
/// Uses `kill(pid, 0)`, which checks for existence without delivering a
/// signal. `EPERM` means the process exists under another user, so it counts
/// as alive.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid_i32) = i32::try_from(pid) else {
        return false;
    };
    #[cfg(unix)]
    {
        // SAFETY: signal 0 performs the permission and existence checks only.
        let result = unsafe { libc::kill(pid_i32, 0) };
        if result == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        // No cheap liveness check here; never prune what we cannot check.
        let _ = pid_i32;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(is_pid_alive(current_pid()));
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!is_pid_alive(0));
    }

    #[cfg(unix)]
    #[test]
    fn reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_pid_alive(pid));
    }
}
